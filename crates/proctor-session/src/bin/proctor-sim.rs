//! Proctor Simulator - runs a scripted exam through the full pipeline

use std::sync::Arc;

use anyhow::{Context, Result};
use face_detector::{ModelCache, ModelProvider};
use lockdown::{DomEvent, Document, Modifiers, NoopKeyboardLock};
use proctor_session::sim::{Script, ScriptedProvider, SyntheticDevices};
use proctor_session::{init_logging, ProctoredSession, SessionDeps, Settings};
use proctoring::{ProctoringStatus, ViolationLog};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load()?;
    init_logging(&settings.logging);

    info!("=== Proctor Simulator v{} ===", env!("CARGO_PKG_VERSION"));

    let script = Arc::new(Script::demo());
    let document = Arc::new(Document::new());
    let log = Arc::new(ViolationLog::new(settings.policy.max_violations));
    log.on_threshold(|count| {
        warn!("Violation limit reached ({}), attempt would be submitted", count);
    });
    let models = Arc::new(ModelCache::new(model_provider(&settings, &script)));

    let mut session = ProctoredSession::new(
        settings,
        SessionDeps {
            devices: Arc::new(SyntheticDevices::new(Arc::clone(&script))),
            models: Arc::clone(&models),
            target: document.clone(),
            keyboard_lock: Arc::new(NoopKeyboardLock),
            sink: log.clone(),
            on_fullscreen_exit: Some(Arc::new(|| {
                warn!("Candidate left fullscreen");
            })),
        },
    );
    session
        .mount()
        .await
        .context("Failed to mount proctored session")?;
    document.set_fullscreen(true);

    let mut state = session.subscribe();
    let deadline = tokio::time::sleep(script.total_duration());
    tokio::pin!(deadline);

    let mut shown: Option<ProctoringStatus> = None;
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = state.borrow_and_update().clone();
                if shown != Some(snapshot.status) {
                    shown = Some(snapshot.status);
                    let scene = script.current().map_or("-", |s| s.label);
                    let reason = snapshot
                        .latest_violation
                        .as_ref()
                        .filter(|_| snapshot.status != ProctoringStatus::Normal)
                        .map_or(String::new(), |v| format!(" ({})", v.message));
                    println!(
                        "[{:<26}] {:<9} faces={}{}",
                        scene,
                        snapshot.status.as_str(),
                        snapshot.face_count,
                        reason
                    );
                }
            }
        }
    }

    let mut escape = DomEvent::key_down("Escape", Modifiers::NONE);
    let delivered = document.dispatch(&mut escape);
    println!("Escape during exam reached the page: {}", delivered);
    document.set_fullscreen(false);

    session.unmount().await;
    models.dispose().await;

    let delivered = document.dispatch(&mut DomEvent::key_down("Escape", Modifiers::NONE));
    println!("Escape after unmount reached the page: {}", delivered);

    println!("{} violations logged", log.len());
    println!("{}", log.to_json()?);
    Ok(())
}

#[cfg(feature = "onnx")]
fn model_provider(settings: &Settings, script: &Arc<Script>) -> Arc<dyn ModelProvider> {
    match &settings.detector.model_path {
        Some(path) => Arc::new(face_detector::onnx::OnnxModelProvider::new(
            path.clone(),
            settings.detector.clone(),
        )),
        None => Arc::new(ScriptedProvider::new(Arc::clone(script))),
    }
}

#[cfg(not(feature = "onnx"))]
fn model_provider(settings: &Settings, script: &Arc<Script>) -> Arc<dyn ModelProvider> {
    if settings.detector.model_path.is_some() {
        warn!("Built without the onnx feature, ignoring detector.model_path");
    }
    Arc::new(ScriptedProvider::new(Arc::clone(script)))
}
