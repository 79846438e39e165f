//! Command line front end for the Keysight scope driver.

use std::io::Write as _;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use serde::Serialize;

use keysight_scope::adapters::visa_adapter::ALL_INSTRUMENTS;
use keysight_scope::adapters::VisaAdapter;
use keysight_scope::config::Settings;
use keysight_scope::instrument::{
    ChannelConfig, ChannelId, ChannelSettings, EdgeCoupling, EdgeReject, EdgeSlope, EdgeSource,
    EdgeTriggerConfig, KeysightScope, TimebaseConfig, TimebaseSettings, TriggerSettings, Waveform,
};
use keysight_scope::scpi::{self, Identity};

#[derive(Parser)]
#[command(name = "keysight-scope", version, about = "Keysight InfiniiVision oscilloscope control over VISA")]
struct Cli {
    /// VISA resource string; discovered interactively when omitted
    #[arg(long, global = true)]
    resource: Option<String>,

    /// Configuration profile under config/
    #[arg(long, global = true)]
    config: Option<String>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// List VISA resources visible to the resource manager
    List,
    /// Print instrument identity and the full settings snapshot
    Info {
        /// Emit JSON instead of TOML
        #[arg(long)]
        json: bool,
    },
    /// Capture a waveform and write it as CSV (time, volts)
    Capture {
        /// Source channel
        #[arg(long, default_value = "channel1")]
        source: ChannelId,
        /// Points to request; defaults to the configured value
        #[arg(long)]
        points: Option<u32>,
        /// Output path; stdout when omitted
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Configure the edge trigger
    Trigger {
        #[arg(long)]
        source: Option<EdgeSource>,
        /// Trigger level, e.g. "500mV" or "1.2"
        #[arg(long)]
        level: Option<String>,
        #[arg(long)]
        coupling: Option<EdgeCoupling>,
        #[arg(long)]
        slope: Option<EdgeSlope>,
        #[arg(long)]
        reject: Option<EdgeReject>,
    },
    /// Configure a vertical channel
    Channel {
        /// Channel to configure
        channel: ChannelId,
        /// Volts per division, e.g. "500mV" or "3.00"
        #[arg(long)]
        scale: Option<String>,
        /// Vertical offset, e.g. "-250mV"
        #[arg(long)]
        offset: Option<String>,
    },
    /// Configure the timebase
    Timebase {
        /// Seconds per division
        #[arg(long)]
        scale: Option<f64>,
        /// Delay from trigger to reference point, in seconds
        #[arg(long)]
        position: Option<f64>,
    },
    /// Run the instrument's autoscale routine
    Autoscale,
    /// Force a trigger event
    ForceTrigger,
}

/// Identity plus the full settings snapshot, for `info` output.
#[derive(Serialize)]
struct InfoReport<'a> {
    identity: &'a Identity,
    trigger: &'a TriggerSettings,
    channel1: &'a ChannelSettings,
    channel2: &'a ChannelSettings,
    channel3: &'a ChannelSettings,
    channel4: &'a ChannelSettings,
    timebase: &'a TimebaseSettings,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::new(cli.config.as_deref())?;
    init_logging(&settings, cli.verbose);

    if matches!(cli.command, CliCommand::List) {
        let resources = VisaAdapter::list_resources(ALL_INSTRUMENTS).await?;
        if resources.is_empty() {
            println!("No VISA resources found.");
        }
        for resource in resources {
            println!("{resource}");
        }
        return Ok(());
    }

    let resource = resolve_resource(cli.resource.clone(), &settings).await?;
    let adapter = VisaAdapter::new(resource)
        .with_timeout(Duration::from_millis(settings.scope.timeout_ms));
    let mut scope = KeysightScope::connect(Box::new(adapter), &settings).await?;

    let result = run_command(&mut scope, &cli.command, &settings).await;
    scope.close().await?;
    result
}

async fn run_command(
    scope: &mut KeysightScope,
    command: &CliCommand,
    settings: &Settings,
) -> Result<()> {
    match command {
        CliCommand::List => Ok(()),

        CliCommand::Info { json } => {
            let report = InfoReport {
                identity: scope.identity(),
                trigger: scope.trigger_settings(),
                channel1: scope.channel_settings(ChannelId::Channel1),
                channel2: scope.channel_settings(ChannelId::Channel2),
                channel3: scope.channel_settings(ChannelId::Channel3),
                channel4: scope.channel_settings(ChannelId::Channel4),
                timebase: scope.timebase_settings(),
            };
            if *json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", toml::to_string_pretty(&report)?);
            }
            Ok(())
        }

        CliCommand::Capture {
            source,
            points,
            output,
        } => {
            let config = keysight_scope::instrument::CaptureConfig {
                source: *source,
                points: (*points).unwrap_or(settings.capture.points),
                ..Default::default()
            };
            let waveform = scope.capture_waveform_with(config).await?;
            write_waveform_csv(&waveform, output.as_deref())?;
            log::info!(
                "Captured {} points from {}",
                waveform.len(),
                waveform.source
            );
            Ok(())
        }

        CliCommand::Trigger {
            source,
            level,
            coupling,
            slope,
            reject,
        } => {
            let level = level
                .as_deref()
                .map(scpi::parse_voltage)
                .transpose()
                .context("Invalid trigger level")?;
            scope
                .setup_edge_trigger(EdgeTriggerConfig {
                    source: *source,
                    level,
                    coupling: *coupling,
                    slope: *slope,
                    reject: *reject,
                })
                .await?;
            print!("{}", toml::to_string_pretty(scope.trigger_settings())?);
            Ok(())
        }

        CliCommand::Channel {
            channel,
            scale,
            offset,
        } => {
            let scale = scale
                .as_deref()
                .map(scpi::parse_voltage)
                .transpose()
                .context("Invalid channel scale")?;
            let offset = offset
                .as_deref()
                .map(scpi::parse_voltage)
                .transpose()
                .context("Invalid channel offset")?;
            scope
                .setup_channel(*channel, ChannelConfig { scale, offset })
                .await?;
            print!("{}", toml::to_string_pretty(scope.channel_settings(*channel))?);
            Ok(())
        }

        CliCommand::Timebase { scale, position } => {
            scope
                .setup_timebase(TimebaseConfig {
                    scale: *scale,
                    position: *position,
                })
                .await?;
            print!("{}", toml::to_string_pretty(scope.timebase_settings())?);
            Ok(())
        }

        CliCommand::Autoscale => scope.autoscale().await,

        CliCommand::ForceTrigger => scope.force_trigger().await,
    }
}

/// Pick the resource to open: command line, then configuration, then
/// discovery. A single discovered resource is used directly; several get
/// a selection menu.
async fn resolve_resource(cli_resource: Option<String>, settings: &Settings) -> Result<String> {
    if let Some(resource) = cli_resource {
        return Ok(resource);
    }
    if let Some(resource) = settings.scope.resource.clone() {
        return Ok(resource);
    }

    let mut resources = VisaAdapter::list_resources(ALL_INSTRUMENTS).await?;
    match resources.len() {
        0 => bail!("No VISA resources found"),
        1 => Ok(resources.remove(0)),
        _ => prompt_for_resource(&resources),
    }
}

fn prompt_for_resource(resources: &[String]) -> Result<String> {
    println!("Select a resource from the following list:");
    for (idx, resource) in resources.iter().enumerate() {
        println!("{}: {}", idx + 1, resource);
    }

    loop {
        print!("\nType the number of the resource desired: ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        match line.trim().parse::<usize>() {
            Ok(n) if (1..=resources.len()).contains(&n) => return Ok(resources[n - 1].clone()),
            _ => println!("'{}' is not a selectable resource.", line.trim()),
        }
    }
}

fn write_waveform_csv(waveform: &Waveform, output: Option<&std::path::Path>) -> Result<()> {
    let mut writer: csv::Writer<Box<dyn std::io::Write>> = match output {
        Some(path) => csv::Writer::from_writer(Box::new(
            std::fs::File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => csv::Writer::from_writer(Box::new(std::io::stdout())),
    };

    writer.write_record(["time", "volts"])?;
    for (time, volts) in waveform.time_axis().iter().zip(waveform.to_volts()) {
        writer.write_record([time.to_string(), volts.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

fn init_logging(settings: &Settings, verbose: u8) {
    let level = match verbose {
        0 => settings
            .log_level
            .parse()
            .unwrap_or(LevelFilter::Info),
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();
}
