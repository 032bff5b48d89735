//! wmp - command-line client for WMP air-conditioning controllers
//!
//! Usage:
//!   wmp --host 192.168.100.246 id        Show device identity
//!   wmp info                             Show device information
//!   wmp get MODE                         Read a feature
//!   wmp set MODE HEAT                    Write a feature
//!   wmp temp 21.5                        Set the set-point temperature
//!   wmp watch                            Print notifications until Ctrl-C

mod cli;

use clap::Parser;
use cli::{Cli, Command};
use serde::Serialize;
use serde_json::json;
use std::process::ExitCode;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;
use wmp_client::config::{self, Config};
use wmp_client::{logging, Client, ClientConfig, Feature, FeatureReport, Result, Value, WmpError};

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    // An explicit config file must be valid; the default one is optional
    let mut config = match &cli.config {
        Some(path) => config::load_from(path)?,
        None => config::config_path()
            .map(|path| config::load(&path))
            .unwrap_or_default(),
    };

    logging::init_tracing(cli.verbose || config.logging.verbose);

    if let Some(host) = &cli.host {
        config.connection.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.connection.port = port;
    }
    config.validate()?;

    let rt = tokio::runtime::Runtime::new().map_err(|e| WmpError::Runtime { source: e })?;
    rt.block_on(run_client(&cli, &config))
}

async fn run_client(cli: &Cli, config: &Config) -> Result<()> {
    let client = Client::new(ClientConfig::from(&config.connection));
    client.connect().await?;

    let mut result = match &cli.password {
        Some(password) => client.login(password).await,
        None => Ok(()),
    };

    if result.is_ok() {
        result = execute(&client, &cli.command, cli.json).await;

        if cli.password.is_some() && client.is_connected() {
            if let Err(e) = client.logout().await {
                warn!("Logout failed: {}", e);
            }
        }
    }

    client.close().await;
    result
}

async fn execute(client: &Client, command: &Command, json: bool) -> Result<()> {
    match command {
        Command::Id => {
            let identity = client.get_device_id().await?;
            if json {
                print_json(&identity);
            } else {
                println!("Model:    {}", identity.model);
                println!("MAC:      {}", identity.mac);
                println!("IP:       {}", identity.ip);
                println!("Protocol: {}", identity.protocol);
                println!("Version:  {}", identity.version);
                println!("RSSI:     {}", identity.rssi);
            }
        }

        Command::Info => {
            let info = client.get_info().await?;
            if json {
                print_json(&info);
            } else {
                for entry in &info.entries {
                    println!("{}: {}", entry.key, entry.value);
                }
            }
        }

        Command::Get { feature } => {
            let value = client.get_feature(Feature::from_token(feature)).await?;
            if json {
                print_json(&value);
            } else {
                println!("{} = {}", value.feature, value.value);
            }
        }

        Command::Set { feature, value } => {
            let feature = Feature::from_token(feature);
            let value = parse_value(&feature, value)?;
            client.set_feature(feature.clone(), value.clone()).await?;
            print_done(json, &feature, &value);
        }

        Command::Temp { degrees: None } => {
            let degrees = client.get_temperature().await?;
            print_temperature(json, &Feature::SetPointTemperature, degrees);
        }

        Command::Temp {
            degrees: Some(degrees),
        } => {
            client.set_temperature(*degrees).await?;
            print_done(json, &Feature::SetPointTemperature, &Value::Temperature(*degrees));
        }

        Command::Ambient => {
            let degrees = client.get_ambient_temperature().await?;
            print_temperature(json, &Feature::AmbientTemperature, degrees);
        }

        Command::On => {
            client.turn_on().await?;
            print_done(json, &Feature::OnOff, &Value::from("ON"));
        }

        Command::Off => {
            client.turn_off().await?;
            print_done(json, &Feature::OnOff, &Value::from("OFF"));
        }

        Command::Watch => watch(client, json).await?,
    }

    Ok(())
}

/// Print notifications until Ctrl-C or connection loss
async fn watch(client: &Client, json: bool) -> Result<()> {
    let mut notifications = client.subscribe();
    let mut health = tokio::time::interval(Duration::from_secs(1));
    eprintln!("Watching for changes (Ctrl-C to stop)...");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),

            note = notifications.recv() => match note {
                Ok(report) => print_notification(json, &report),
                Err(RecvError::Lagged(missed)) => warn!("Missed {} notifications", missed),
                Err(RecvError::Closed) => return Err(WmpError::ConnectionClosed),
            },

            _ = health.tick() => {
                if !client.is_connected() {
                    return Err(WmpError::ConnectionClosed);
                }
            }
        }
    }
}

/// Temperature features take degrees on the command line
fn parse_value(feature: &Feature, raw: &str) -> Result<Value> {
    if !feature.is_temperature() {
        return Ok(Value::from(raw));
    }
    raw.trim()
        .parse::<f64>()
        .map(Value::Temperature)
        .map_err(|_| WmpError::ValueEncode {
            feature: feature.to_string(),
            reason: format!("'{}' is not a temperature", raw),
        })
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => warn!("JSON output failed: {}", e),
    }
}

fn print_done(json: bool, feature: &Feature, value: &Value) {
    if json {
        print_json(&json!({ "feature": feature, "value": value, "ok": true }));
    } else {
        println!("{} <- {}", feature, value);
    }
}

fn print_temperature(json: bool, feature: &Feature, degrees: f64) {
    if json {
        print_json(&json!({ "feature": feature, "value": degrees }));
    } else {
        println!("{} = {:.1}", feature, degrees);
    }
}

fn print_notification(json: bool, report: &FeatureReport) {
    if json {
        print_json(report);
        return;
    }

    let timestamp = chrono::Local::now().format("%H:%M:%S%.3f");
    match report.slot {
        Some(slot) => println!(
            "[{}] {},{} = {}",
            timestamp, report.value.feature, slot, report.value.value
        ),
        None => println!("[{}] {} = {}", timestamp, report.value.feature, report.value.value),
    }
}
