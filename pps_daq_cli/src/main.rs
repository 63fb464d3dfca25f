use clap::{value_parser, Arg, ArgMatches, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use simplelog::{ColorChoice, CombinedLogger, LevelFilter, TermLogger, TerminalMode, WriteLogger};
use std::error::Error;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use libpps_daq::abort::install_interrupt_handler;
use libpps_daq::acquisition::{AcquisitionContext, AcquisitionSettings};
use libpps_daq::assembler::{EventSource, MeasurementAssembler};
use libpps_daq::burst_stack::BurstStack;
use libpps_daq::config::Config;
use libpps_daq::constants::DEFAULT_COORDINATOR_PORT;
use libpps_daq::coordinator::Coordinator;
use libpps_daq::error::{AssemblerError, ListenerError};
use libpps_daq::file_copier::FileCopier;
use libpps_daq::listener::Listener;
use libpps_daq::simulation::SimulatedCrate;
use libpps_daq::status::{BurstStatus, RunStatistics, StatusSink};
use libpps_daq::tdc_file::TdcFile;

const LOG_FILE: &str = "pps_daq.log";

/// Shows the progress of the open burst towards the next file rotation
struct ProgressSink {
    bar: ProgressBar,
}

impl ProgressSink {
    fn new(pb_manager: &MultiProgress, triggers_per_file: u64) -> Self {
        let bar = pb_manager.add(ProgressBar::new(triggers_per_file));
        if let Ok(style) =
            ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {pos}/{len} triggers")
        {
            bar.set_style(style);
        }
        Self { bar }
    }
}

impl StatusSink for ProgressSink {
    fn new_burst(&mut self, run_id: u32, spill_id: u32) {
        self.bar.reset();
        self.bar.set_message(format!("Run {run_id} burst {spill_id}"));
    }

    fn monitor(&mut self, status: &BurstStatus) {
        self.bar
            .set_position(status.triggers_in_burst.min(status.triggers_per_file));
    }

    fn run_statistics(&mut self, _stats: &RunStatistics) {
        self.bar.finish_and_clear();
    }
}

fn init_logging(pb_manager: &MultiProgress) -> Result<(), Box<dyn Error>> {
    let logger = CombinedLogger::new(vec![
        TermLogger::new(
            LevelFilter::Info,
            simplelog::Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(
            LevelFilter::Info,
            simplelog::Config::default(),
            File::create(LOG_FILE)?,
        ),
    ]);
    LogWrapper::new(pb_manager.clone(), logger).try_init()?;
    log::set_max_level(LevelFilter::Info);
    Ok(())
}

fn make_template_config(path: &Path) -> Result<(), Box<dyn Error>> {
    log::info!("Making a template config at {}...", path.to_string_lossy());
    Config::default().write_config_file(path)?;
    Ok(())
}

fn run_acquisition(config_path: &Path, pb_manager: &MultiProgress) -> Result<(), Box<dyn Error>> {
    log::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = Config::read_config_file(config_path)?;
    log::info!("Config successfully loaded.");
    let run_id = config.get_run_id()?;
    log::info!("Output Path: {}", config.output_path.to_string_lossy());
    if let Some(transfer) = config.get_transfer_directory(run_id) {
        log::info!("Transfer Path: {}", transfer.to_string_lossy());
    }
    log::info!("Run: {run_id} Boards: {}", config.get_number_of_boards());
    log::info!(
        "Global Mode: {:?} Triggers per File: {}",
        config.global_mode,
        config.triggers_per_file
    );

    let abort = install_interrupt_handler()?;

    let sim = SimulatedCrate::new(&config.simulation, config.fanout_registers.clone());
    let boards = config
        .board_addresses
        .iter()
        .map(|address| sim.board(*address, config.acquisition_mode, config.detection_mode))
        .collect();

    let copier = config
        .get_transfer_directory(run_id)
        .map(|dir| FileCopier::new(&dir, config.delete_transferred));

    let coordinator = match config.coordinator_port {
        Some(port) => match Coordinator::bind(("0.0.0.0", port)) {
            Ok(coordinator) => {
                log::info!("Listeners can connect on port {port}");
                Some(coordinator)
            }
            Err(e) => {
                log::warn!("Running without listeners: {e}");
                None
            }
        },
        None => None,
    };
    let sink = (
        ProgressSink::new(pb_manager, config.triggers_per_file),
        coordinator,
    );

    let mut context = AcquisitionContext::new(
        AcquisitionSettings::from_config(&config, run_id),
        boards,
        Some(sim.fanout()),
        copier,
        sink,
        abort,
    );
    log::info!("Starting acquisition. Press Ctrl-C to stop.");
    let stats = context.run()?;
    if let Some(copier) = context.get_consumer() {
        log::info!(
            "Transferred {} file(s) to {}",
            copier.get_files_copied(),
            copier.get_destination().to_string_lossy()
        );
    }
    log::info!("Run {} finished: {} events.", stats.run_id, stats.total_events());
    Ok(())
}

fn print_events<S>(source: &mut S) -> Result<u64, AssemblerError>
where
    S: EventSource,
    AssemblerError: From<S::Error>,
{
    let mut n_events = 0;
    while let Some(event) = source.next_event()? {
        println!("{event}");
        n_events += 1;
    }
    Ok(n_events)
}

fn print_measurements<S>(
    source: &mut S,
    assembler: MeasurementAssembler,
    channel: u8,
) -> Result<u64, AssemblerError>
where
    S: EventSource,
    AssemblerError: From<S::Error>,
{
    let mut n_measurements = 0;
    while let Some(measurement) = assembler.next_measurement(source, channel)? {
        let tot = measurement
            .time_over_threshold()
            .map_or(String::from("-"), |tot| tot.to_string());
        println!(
            "channel {} leading {:?} trailing {:?} tot {tot}{}{}",
            measurement.channel,
            measurement.leading_times(),
            measurement.trailing_times(),
            if measurement.is_complete() { "" } else { " incomplete" },
            if measurement.has_error() { " error" } else { "" },
        );
        n_measurements += 1;
    }
    Ok(n_measurements)
}

fn dump(matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let channel = matches.get_one::<u8>("channel").copied();
    let n_printed = if let Some(path) = matches.get_one::<String>("file") {
        let mut file = TdcFile::open(&PathBuf::from(path))?;
        let written = file
            .get_write_time()
            .and_then(|t| OffsetDateTime::from(t).format(&Rfc3339).ok())
            .unwrap_or_else(|| String::from("unknown"));
        let header = file.header();
        println!(
            "{} (written {written})",
            file.get_filename().to_string_lossy()
        );
        println!(
            "Run {} spill {} acquisition mode {} detection mode {} ({} words)",
            header.run_id,
            header.spill_id,
            header.acq_mode,
            header.det_mode,
            file.get_number_of_events()
        );
        let n_printed = match channel {
            Some(channel) => {
                let assembler = MeasurementAssembler::for_file(&file)?;
                print_measurements(&mut file, assembler, channel)?
            }
            None => print_events(&mut file)?,
        };
        log::info!(
            "Read {} of {} words.",
            file.get_events_read(),
            file.get_number_of_events()
        );
        n_printed
    } else {
        let directory = matches
            .get_one::<String>("directory")
            .ok_or("Either a file or a directory is needed")?;
        let run_id = *matches
            .get_one::<u32>("run")
            .ok_or("A run number is needed with a directory")?;
        let board = matches.get_one::<usize>("board").copied().unwrap_or(0);
        let mut stack = BurstStack::new(&PathBuf::from(directory), run_id, board)?;
        log::info!(
            "Reading {} file(s) of run {} board {}",
            stack.file_stack.len() + 1,
            stack.get_run_id(),
            stack.get_board()
        );
        match channel {
            Some(channel) => {
                let assembler =
                    MeasurementAssembler::from_mode_code(stack.get_active_header().acq_mode)?;
                print_measurements(&mut stack, assembler, channel)?
            }
            None => print_events(&mut stack)?,
        }
    };
    log::info!("Printed {n_printed} entries.");
    Ok(())
}

fn listen(matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let address = matches
        .get_one::<String>("address")
        .cloned()
        .unwrap_or_else(|| format!("127.0.0.1:{DEFAULT_COORDINATOR_PORT}"));
    let mut listener = Listener::connect(address.as_str())?;
    log::info!(
        "Connected to {} as listener {}",
        listener.peer_address()?,
        listener.get_id()
    );
    loop {
        match listener.receive() {
            Ok(message) => log::info!("{message}"),
            Err(ListenerError::MasterDisconnected) => {
                log::info!("The acquisition closed the session.");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn main() -> ExitCode {
    // Create a cli
    let matches = Command::new("pps_daq_cli")
        .arg_required_else_help(true)
        .subcommand(
            Command::new("new")
                .about("Make a template configuration yaml file")
                .arg(
                    Arg::new("path")
                        .short('p')
                        .long("path")
                        .required(true)
                        .help("Path to the file"),
                ),
        )
        .subcommand(
            Command::new("run")
                .about("Run an acquisition until interrupted")
                .arg(
                    Arg::new("path")
                        .short('p')
                        .long("path")
                        .required(true)
                        .help("Path to the configuration file"),
                ),
        )
        .subcommand(
            Command::new("dump")
                .about("Print the content of a data file, or of a whole run")
                .arg(
                    Arg::new("file")
                        .short('f')
                        .long("file")
                        .conflicts_with("directory")
                        .help("Path to a data file"),
                )
                .arg(
                    Arg::new("directory")
                        .short('d')
                        .long("directory")
                        .requires("run")
                        .help("Output directory of a run"),
                )
                .arg(
                    Arg::new("run")
                        .short('r')
                        .long("run")
                        .value_parser(value_parser!(u32))
                        .help("Run number"),
                )
                .arg(
                    Arg::new("board")
                        .short('b')
                        .long("board")
                        .value_parser(value_parser!(usize))
                        .help("Board index (default 0)"),
                )
                .arg(
                    Arg::new("channel")
                        .short('c')
                        .long("channel")
                        .value_parser(value_parser!(u8))
                        .help("Group the words into measurements of this channel"),
                ),
        )
        .subcommand(
            Command::new("listen")
                .about("Follow a running acquisition")
                .arg(
                    Arg::new("address")
                        .short('a')
                        .long("address")
                        .help("host:port of the acquisition (default 127.0.0.1:1987)"),
                ),
        )
        .get_matches();

    // Initialize feedback
    let pb_manager = MultiProgress::new();
    if let Err(e) = init_logging(&pb_manager) {
        eprintln!("Could not create logging/progress: {e}");
        return ExitCode::FAILURE;
    }

    let result = match matches.subcommand() {
        Some(("new", sub)) => sub
            .get_one::<String>("path")
            .ok_or_else(|| "A path is needed".into())
            .and_then(|path| make_template_config(&PathBuf::from(path))),
        Some(("run", sub)) => sub
            .get_one::<String>("path")
            .ok_or_else(|| "A path is needed".into())
            .and_then(|path| run_acquisition(&PathBuf::from(path), &pb_manager)),
        Some(("dump", sub)) => dump(sub),
        Some(("listen", sub)) => listen(sub),
        _ => Err("Unknown command".into()),
    };

    match result {
        Ok(()) => {
            log::info!("Done.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
