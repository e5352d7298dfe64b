/// Focus session command: wires the HTTP service clients and the JSONL
/// event sink into the daemon, then feeds it host events parsed from
/// stdin. Capture stays disabled here; a platform build plugs its own
/// [`helmsman_services::CaptureDevice`] into the service bundle.
use anyhow::Result;
use helmsman_core::{get_data_dir, DaemonServices, FocusDaemon, HelmsmanConfig, HostEvent};
use helmsman_services::{
    DisabledCapture, HttpClassifier, HttpDialogue, HttpSynthesizer, HttpTranscriber,
    JsonlEventSink, LogPlayback,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub async fn watch_command(goal: String, contexts: Vec<String>) -> Result<()> {
    let config = HelmsmanConfig::load()?;
    let services = build_services(&config)?;
    let (event_tx, event_rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();

    tokio::spawn(read_host_events(event_tx));
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("received Ctrl-C, ending session");
            ctrl_c_cancel.cancel();
        }
    });

    let daemon = FocusDaemon::new(config, services, goal, contexts);
    let session = daemon.run(event_rx, cancel).await;

    println!("Session summary");
    println!("  goal: {}", session.goal);
    println!("  focused: {}s", session.focused_secs);
    println!(
        "  drifted: {}s across {} drift event(s)",
        session.drifted_secs, session.drift_events
    );
    Ok(())
}

fn build_services(config: &HelmsmanConfig) -> Result<DaemonServices> {
    let key = config.services.effective_api_key();
    let base = &config.services.base_url;
    let sink = JsonlEventSink::new(&get_data_dir()?);
    Ok(DaemonServices {
        capture: Arc::new(DisabledCapture),
        classifier: Arc::new(HttpClassifier::new(&key, base)),
        transcriber: Arc::new(HttpTranscriber::new(&key, base)),
        dialogue: Arc::new(HttpDialogue::new(&key, base)),
        synthesizer: Arc::new(HttpSynthesizer::new(&key, base, &config.services.voice)),
        playback: Arc::new(LogPlayback),
        sink: Arc::new(sink),
    })
}

/// Forward JSON-line host events until stdin closes. Malformed lines are
/// logged and skipped; closing stdin ends the session cleanly.
async fn read_host_events(tx: mpsc::Sender<HostEvent>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<HostEvent>(line) {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => log::warn!("ignoring malformed host event: {e}"),
                }
            }
            Ok(None) => break,
            Err(e) => {
                log::warn!("stdin read failed: {e}");
                break;
            }
        }
    }
}
