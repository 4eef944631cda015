use anyhow::{bail, Context};
use camera_observer::config::{DEFAULT_BASE_URL, TOKEN_ENV};
use camera_observer::{Device, SmartThingsClient};
use clap::Parser;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Lists SmartThings devices so their ids can be copied into the camera mapping.
#[derive(Parser, Debug)]
#[command(name = "list-devices", version)]
struct Args {
    /// SmartThings personal access token
    #[arg(long, env = TOKEN_ENV, hide_env_values = true)]
    token: String,

    /// SmartThings API base URL
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    base_url: String,
}

fn render(devices: &[Device]) -> String {
    let mut out = String::from("\n=== SmartThings Devices ===\n\n");
    for device in devices {
        out.push_str(&format!("Device ID: {}\n", device.device_id));
        out.push_str(&format!("  Name: {}\n", device.name));
        out.push_str(&format!("  Label: {}\n\n", device.label));
    }
    out
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if args.token.trim().is_empty() {
        bail!("please provide --token with your SmartThings API token");
    }

    let client = SmartThingsClient::with_options(
        args.token,
        &args.base_url,
        Duration::from_secs(10),
        Duration::ZERO,
    )
    .context("failed to build SmartThings client")?;

    let devices = client.list_devices().await.context("failed to list devices")?;
    info!("{} devices returned", devices.len());

    print!("{}", render(&devices));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_flag_is_required_and_base_url_defaults() {
        std::env::remove_var(TOKEN_ENV);
        assert!(Args::try_parse_from(["list-devices"]).is_err());

        let args = Args::try_parse_from(["list-devices", "--token", "abc"]).unwrap();
        assert_eq!(args.token, "abc");
        assert_eq!(args.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn render_prints_id_name_label() {
        let out = render(&[Device {
            device_id: "aaaa-1111".into(),
            name: "c2c-switch".into(),
            label: "Front cam plug".into(),
        }]);
        assert!(out.contains("Device ID: aaaa-1111\n"));
        assert!(out.contains("  Name: c2c-switch\n"));
        assert!(out.contains("  Label: Front cam plug\n"));
    }
}
