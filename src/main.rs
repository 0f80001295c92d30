use skipper::mission::{MissionPhase, MissionReport};
use skipper::{MavVehicle, NavConfig, NominatimGeocoder, OllamaPlanner, Session, StepStatus};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const DEFAULT_MAVLINK_ADDR: &str = "udpin:0.0.0.0:14540";
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_MODEL: &str = "llama3.1";

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "session ended with error");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mavlink_addr = env_or("SKIPPER_MAVLINK_ADDR", DEFAULT_MAVLINK_ADDR);
    let ollama_url = env_or("SKIPPER_OLLAMA_URL", DEFAULT_OLLAMA_URL);
    let model = env_or("SKIPPER_MODEL", DEFAULT_MODEL);

    let planner = Arc::new(OllamaPlanner::new(&ollama_url, &model)?);
    let geocoder: Arc<dyn skipper::Geocoder> = match env::var("SKIPPER_NOMINATIM_URL") {
        Ok(endpoint) => Arc::new(NominatimGeocoder::with_endpoint(&endpoint)?),
        Err(_) => Arc::new(NominatimGeocoder::new()?),
    };

    info!(address = %mavlink_addr, "connecting to vehicle");
    let vehicle = MavVehicle::connect(&mavlink_addr).await?;
    info!("vehicle link established");

    let cancel = CancellationToken::new();
    {
        // Ctrl-C cancels the running mission; the prompt loop keeps going.
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                info!("cancellation requested");
                cancel.cancel();
            }
        });
    }

    let session = Session::new(
        planner,
        geocoder,
        Arc::new(vehicle),
        NavConfig::default(),
        cancel,
    );

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        stdout.write_all(b"instruction> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let instruction = line.trim();
        if instruction.is_empty() {
            continue;
        }
        if skipper::session::is_stop_request(instruction) {
            break;
        }

        let report = session.execute_instruction(instruction).await?;
        print_report(&mut stdout, &report).await?;
        if report.session_fatal {
            error!("vehicle link lost, ending session");
            break;
        }
    }

    info!("session closed");
    Ok(())
}

async fn print_report(
    stdout: &mut tokio::io::Stdout,
    report: &MissionReport,
) -> std::io::Result<()> {
    if report.phase == MissionPhase::Empty {
        stdout
            .write_all(b"no executable plan produced; try rephrasing\n")
            .await?;
        return Ok(());
    }

    for outcome in &report.outcomes {
        let marker = match outcome.status {
            StepStatus::Success => "ok",
            StepStatus::Error => "error",
            StepStatus::Timeout => "timeout",
            StepStatus::Cancelled => "cancelled",
        };
        let line = format!(
            "[{:>2}] {:<18} {:<9} {}\n",
            outcome.step_index, outcome.action, marker, outcome.message
        );
        stdout.write_all(line.as_bytes()).await?;
    }

    let line = format!("mission {:?}\n", report.phase);
    stdout.write_all(line.to_lowercase().as_bytes()).await?;
    Ok(())
}
