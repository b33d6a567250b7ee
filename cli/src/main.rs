use kube::Client;
use std::env;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::FmtSubscriber;

use kdrift::differ::Differ;
use kdrift::inventory::Inventory;
use kdrift::manager::KubeResourceManager;
use kdrift::resource;

fn init() {
    let log_level = env::var("LOG_LEVEL")
        .unwrap_or(String::from("warn"))
        .to_lowercase();

    if !["none"].contains(&log_level.as_str()) || !log_level.is_empty() {
        let (level, filter) = if ["-1", "error"].contains(&log_level.as_str()) {
            (Level::ERROR, EnvFilter::new("error"))
        } else if ["0", "warn", "warning"].contains(&log_level.as_str()) {
            (Level::WARN, EnvFilter::new("warn"))
        } else if ["1", "info", "default"].contains(&log_level.as_str()) {
            (Level::INFO, EnvFilter::new("info"))
        } else if ["2", "debug"].contains(&log_level.as_str()) {
            (Level::DEBUG, EnvFilter::new("kdrift=debug")) // Debug only from this crate
        } else if ["3", "trace", "tracing"].contains(&log_level.as_str()) {
            (Level::TRACE, EnvFilter::new("kdrift=trace")) // Trace only from this crate
        } else {
            (Level::INFO, EnvFilter::new("info")) // fallback in case our spelling sucks
        };

        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_env_filter(filter)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .expect("setting default subscriber failed");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init();

    info!(
        "kdrift version {}",
        kdrift::BUILD_VERSION.map_or(kdrift::VERSION, |v| v)
    );

    match run().await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::from(2)
        }
    }
}

async fn run() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let manifest_path =
        env::var("MANIFEST_PATH").map_err(|_| "MANIFEST_PATH environment variable not set")?;
    let inventory_path = env::var("INVENTORY_PATH").ok();
    let prune = env::var("PRUNE")
        .ok()
        .map(|v| {
            matches!(
                v.trim().to_lowercase().as_str(),
                "true" | "1" | "yes" | "y" | "on"
            )
        })
        .unwrap_or(false);
    let timeout_in_seconds_str = env::var("TIMEOUT_IN_SECONDS").unwrap_or(String::from("120"));
    let field_manager = env::var("FIELD_MANAGER").unwrap_or(String::from("kdrift"));
    let color = env::var("NO_COLOR").is_err();

    let timeout_in_seconds: u64 = timeout_in_seconds_str.parse().map_err(|_| {
        format!(
            "TIMEOUT_IN_SECONDS must be a valid integer: {}",
            timeout_in_seconds_str
        )
    })?;

    let manifests = std::fs::read_to_string(&manifest_path)
        .map_err(|e| format!("Failed to read manifests from {}: {}", manifest_path, e))?;
    let objects = resource::parse_objects(&manifests)?;
    info!(
        "loaded {} desired objects from {}",
        objects.len(),
        manifest_path
    );

    let old_inventory = match inventory_path {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| format!("Failed to read inventory from {}: {}", path, e))?;
            let inventory: Inventory = serde_yaml::from_str(&raw)
                .map_err(|e| format!("Failed to parse inventory {}: {}", path, e))?;
            Some(inventory)
        }
        None => None,
    };

    let client = Client::try_default()
        .await
        .map_err(|e| format!("Failed to load k8s client: {}", e))?;
    let manager = KubeResourceManager::new(client, field_manager).await;

    let differ = Differ::new(manager, Duration::from_secs(timeout_in_seconds))
        .with_prune(prune)
        .with_color(color);
    let outcome = differ.diff(&objects, old_inventory.as_ref()).await;

    print!("{}", outcome.report);

    if !outcome.errors.is_empty() {
        for e in &outcome.errors {
            error!("{}", e);
        }
        return Ok(ExitCode::from(2));
    }
    if outcome.created_or_drifted {
        info!("changes identified");
        return Ok(ExitCode::from(1));
    }
    info!("no changes identified");
    Ok(ExitCode::SUCCESS)
}
