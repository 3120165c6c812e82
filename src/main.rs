use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use busbridge::transport::{Baudrate, SerialTransport};
use busbridge::{BridgeConfig, ProfileDB, Session, Transport};

#[derive(Parser)]
#[command(
    name = "busbridge",
    version,
    about = "Drive a byte-stream to register-bus bridge, real or simulated"
)]
struct Cli {
    /// Talk to a hardware bridge on this serial port
    #[arg(long, global = true)]
    port: Option<String>,
    /// Talk to a hardware bridge on the first serial port found
    #[arg(long, global = true, conflicts_with = "port")]
    serial: bool,
    #[arg(long, global = true, value_enum, default_value_t = Baudrate::default())]
    baudrate: Baudrate,
    /// Number of targets the hardware bridge was built with
    #[arg(long, global = true, default_value_t = 1)]
    targets: usize,
    /// Hardware bridge sends 16-bit responses
    #[arg(long, global = true)]
    narrow: bool,
    /// Hardware bridge is built without block transfer
    #[arg(long, global = true)]
    no_block: bool,
    /// Simulation profile: a built-in name or a YAML file
    #[arg(long, global = true, default_value = "default")]
    profile: String,
    /// More output, repeat for more
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show bridge configuration
    Info {},
    /// List built-in simulation profiles
    Profiles {},
    /// List serial ports
    Ports {},
    /// Check the bridge is in sync
    Sync {},
    /// Read one register
    Read {
        #[arg(value_parser = parse_u8)]
        target: u8,
        #[arg(value_parser = parse_u16)]
        address: u16,
    },
    /// Write one register
    Write {
        #[arg(value_parser = parse_u8)]
        target: u8,
        #[arg(value_parser = parse_u16)]
        address: u16,
        #[arg(value_parser = parse_u32)]
        value: u32,
    },
    /// Set the auxiliary control/status register
    Aux {
        #[arg(value_parser = parse_u32)]
        value: u32,
    },
    /// Block-read words and hexdump them
    Dump {
        #[arg(value_parser = parse_u8)]
        target: u8,
        #[arg(value_parser = parse_u16)]
        address: u16,
        /// Number of words
        #[arg(value_parser = parse_usize)]
        count: usize,
        /// Read the same address repeatedly
        #[arg(long)]
        no_increment: bool,
    },
    /// Write an image file (binary, hex or Intel HEX) into a target
    Load {
        path: String,
        #[arg(value_parser = parse_u8)]
        target: u8,
        #[arg(value_parser = parse_u16, default_value = "0")]
        address: u16,
        /// Read the image back afterwards
        #[arg(long)]
        verify: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let _ = simplelog::TermLogger::init(
        log_level(cli.verbose),
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    if let Commands::Profiles {} = cli.command {
        for profile in ProfileDB::load()?.profiles() {
            println!("{:<10} {}", profile.name, profile.description);
            println!("{:<10} {}", "", profile.bridge);
            for (i, t) in profile.targets.iter().enumerate() {
                println!(
                    "{:<10} #{} {} ({} bytes, latency {}+{})",
                    "", i, t.name, t.size, t.latency, t.jitter
                );
            }
        }
        return Ok(());
    }
    if let Commands::Ports {} = cli.command {
        for port in SerialTransport::scan_ports()? {
            println!("{}", port);
        }
        return Ok(());
    }

    if cli.port.is_some() || cli.serial {
        let config = BridgeConfig {
            targets: cli.targets,
            block_transfer: !cli.no_block,
            narrow_response: cli.narrow,
        };
        let mut session = Session::new_from_serial(cli.port.as_deref(), cli.baudrate, config)?;
        run(&mut session, cli.command)
    } else {
        let profile = ProfileDB::find(&cli.profile)?;
        let mut session = Session::new_simulated(&profile)?;
        run(&mut session, cli.command)
    }
}

fn run<T: Transport>(session: &mut Session<T>, command: Commands) -> Result<()> {
    match command {
        Commands::Info {} => {
            session.dump_info()?;
        }
        // handled before a session is opened
        Commands::Profiles {} | Commands::Ports {} => (),
        Commands::Sync {} => {
            session.sync()?;
            log::info!("Bridge in sync");
        }
        Commands::Read { target, address } => {
            let value = session.read(target, address)?;
            println!("{:#010x}", value);
        }
        Commands::Write {
            target,
            address,
            value,
        } => {
            session.write(target, address, value)?;
            session.transport_mut().flush()?;
        }
        Commands::Aux { value } => {
            session.set_aux(value)?;
        }
        Commands::Dump {
            target,
            address,
            count,
            no_increment,
        } => {
            let bar = progress_bar(count)?;
            let words = session.read_block_with(target, address, count, !no_increment, |n| {
                bar.set_position(n as u64)
            })?;
            bar.finish_and_clear();

            let mut out = Vec::new();
            hxdmp::hexdump(&busbridge::format::words_to_bytes(&words), &mut out)?;
            println!("{}", String::from_utf8_lossy(&out));
        }
        Commands::Load {
            path,
            target,
            address,
            verify,
        } => {
            let raw = busbridge::format::read_image_from_file(path)?;
            let words = busbridge::format::bytes_to_words(&raw);
            log::info!("Image size: {} bytes, {} words", raw.len(), words.len());

            let bar = progress_bar(words.len())?;
            session.load_with(target, address, &words, |n| bar.set_position(n as u64))?;
            bar.finish_and_clear();
            if verify {
                session.verify(target, address, &words)?;
                log::info!("Verified!");
            }
        }
    }
    Ok(())
}

fn log_level(verbose: u8) -> simplelog::LevelFilter {
    match verbose {
        0 => simplelog::LevelFilter::Info,
        1 => simplelog::LevelFilter::Debug,
        _ => simplelog::LevelFilter::Trace,
    }
}

fn progress_bar(len: usize) -> Result<ProgressBar> {
    let bar = ProgressBar::new(len as u64);
    bar.set_style(ProgressStyle::with_template(
        "{spinner} [{bar:40}] {pos}/{len} words",
    )?);
    Ok(bar)
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(&hex.replace('_', ""), 16),
        None => s.replace('_', "").parse(),
    };
    parsed.map_err(|e| format!("{:?}: {}", s, e))
}

fn parse_u16(s: &str) -> Result<u16, String> {
    let n = parse_u32(s)?;
    u16::try_from(n).map_err(|_| format!("{:#x} does not fit in 16 bits", n))
}

fn parse_u8(s: &str) -> Result<u8, String> {
    let n = parse_u32(s)?;
    u8::try_from(n).map_err(|_| format!("{:#x} does not fit in 8 bits", n))
}

fn parse_usize(s: &str) -> Result<usize, String> {
    parse_u32(s).map(|n| n as usize)
}
