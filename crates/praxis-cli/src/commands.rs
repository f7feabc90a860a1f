use std::io::{self, BufRead, Write};
use std::path::Path;

use eyre::{Result, WrapErr, bail, eyre};
use praxis_auth::flows::AuthResult;
use praxis_client::config::{self, ClientConfig};
use praxis_client::{BackendMode, NarrativeHandler, PraxisClient};
use praxis_core::models::document::{DocumentContent, DocumentFilter, DocumentPatch, NewDocument};
use praxis_core::models::narrative::NarrativeRequest;
use praxis_core::models::settings::Settings;
use praxis_core::models::telemetry::UsageEvent;
use praxis_narrative::events::StopReason;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::{ClientsCommand, DocsCommand, SettingsCommand};

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    eprint!("{label}: ");
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

pub async fn login(
    client: &PraxisClient,
    username: &str,
    password: Option<String>,
    code: Option<String>,
) -> Result<()> {
    let password = match password {
        Some(password) => password,
        None => prompt("Password")?,
    };

    let mut result = client.auth().login(username, &password).await?;
    if let AuthResult::MfaChallenge { session } = &result {
        let code = match code {
            Some(code) => code,
            None => prompt("MFA code")?,
        };
        result = client.auth().verify_mfa(username, session, &code).await?;
    }

    match result {
        AuthResult::Success { profile } => {
            let name = profile.map(|p| p.display_name.unwrap_or(p.username));
            println!("Signed in as {}", name.as_deref().unwrap_or(username));
            Ok(())
        }
        AuthResult::MfaChallenge { .. } => bail!("server asked for a second MFA challenge"),
    }
}

pub async fn logout(client: &PraxisClient) -> Result<()> {
    client.auth().logout().await;
    println!("Signed out");
    Ok(())
}

pub fn whoami(client: &PraxisClient) -> Result<()> {
    let status = client.auth().status();
    match client.auth().current_user() {
        Some(profile) if client.auth().is_logged_in() => print_json(&json!({
            "mode": client.mode().as_str(),
            "session": format!("{status:?}"),
            "user": profile,
        })),
        _ => {
            println!("Not signed in ({} backend)", client.mode());
            Ok(())
        }
    }
}

/// Show the saved mode, or persist a new one.
pub fn mode(mut saved: ClientConfig, path: &Path, mode: Option<BackendMode>) -> Result<()> {
    match mode {
        None => println!("{}", saved.mode),
        Some(mode) => {
            saved.mode = mode;
            config::save_to(&saved, path)?;
            info!(%mode, path = %path.display(), "mode saved");
            println!("Backend mode set to {mode}");
        }
    }
    Ok(())
}

pub async fn clients(client: &PraxisClient, command: ClientsCommand) -> Result<()> {
    let api = client.clients();
    match command {
        ClientsCommand::List => print_json(&api.list().await?),
        ClientsCommand::Create { name, id } => print_json(&api.create(&name, id.as_deref()).await?),
        ClientsCommand::Rename { id, name } => print_json(&api.rename(&id, &name).await?),
        ClientsCommand::Archive { id } => print_json(&api.archive(&id).await?),
        ClientsCommand::Unarchive { id } => print_json(&api.unarchive(&id).await?),
    }
}

pub async fn docs(client: &PraxisClient, command: DocsCommand) -> Result<()> {
    let documents = client.documents();
    match command {
        DocsCommand::List {
            client: client_id,
            document_type,
            status,
        } => {
            let filter = DocumentFilter {
                document_type,
                status,
            };
            print_json(&documents.list(&client_id, filter).await?)
        }
        DocsCommand::Get { client: client_id, id } => match documents.get(&client_id, &id).await? {
            Some(doc) => print_json(&doc),
            None => bail!("no document {id} for client {client_id}"),
        },
        DocsCommand::Create {
            client: client_id,
            document_type,
            status,
            date,
            content,
            id,
        } => {
            let content: DocumentContent =
                serde_json::from_str(&content).wrap_err("--content must be a JSON object")?;
            let mut new = NewDocument::new(document_type, content);
            new.status = status;
            new.date = date;
            new.id = id;

            let created = documents.create(&client_id, &new).await?;
            let event = UsageEvent::new("document.created")
                .for_client(&client_id)
                .with_attribute("type", json!(document_type.as_str()));
            client.telemetry().report(&event).await;
            print_json(&created)
        }
        DocsCommand::Status {
            client: client_id,
            id,
            status,
        } => {
            let patch = DocumentPatch {
                status: Some(status),
                ..Default::default()
            };
            print_json(&documents.update(&client_id, &id, &patch).await?)
        }
        DocsCommand::Delete { client: client_id, id } => {
            documents.delete(&client_id, &id).await?;
            println!("Deleted {id}");
            Ok(())
        }
        DocsCommand::Summary { client: client_id } => {
            let (note, diagnosis, plan) = tokio::try_join!(
                documents.latest_note(&client_id),
                documents.current_diagnosis(&client_id),
                documents.active_treatment_plan(&client_id),
            )?;
            print_json(&json!({
                "latestNote": note,
                "currentDiagnosis": diagnosis,
                "activeTreatmentPlan": plan,
            }))
        }
    }
}

/// Writes chunks to stdout as they arrive.
#[derive(Default)]
struct TerminalWriter {
    stop_reason: Option<StopReason>,
    error: Option<String>,
}

impl NarrativeHandler for TerminalWriter {
    fn on_chunk(&mut self, text: &str) {
        let mut stdout = io::stdout().lock();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }

    fn on_complete(&mut self, stop_reason: &StopReason) {
        println!();
        self.stop_reason = Some(stop_reason.clone());
    }

    fn on_error(&mut self, message: &str) {
        println!();
        self.error = Some(message.to_string());
    }
}

pub async fn narrate(client: &PraxisClient, request: &NarrativeRequest, buffered: bool) -> Result<()> {
    if buffered {
        let response = client.narratives().generate(request).await?;
        println!("{}", response.text);
        eprintln!("[{}]", response.stop_reason);
        return Ok(());
    }

    let stream = client.narratives().stream(request)?;
    let cancel = stream.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let mut writer = TerminalWriter::default();
    stream.drive(&mut writer).await;

    if let Some(message) = writer.error {
        return Err(eyre!("narrative failed: {message}"));
    }
    let reason = writer.stop_reason.unwrap_or(StopReason::EndTurn);
    eprintln!("[{reason}]");
    // Awaited: a detached send would not outlive the process.
    let event =
        UsageEvent::new("narrative.streamed").with_attribute("stopReason", json!(reason.as_str()));
    client.telemetry().report(&event).await;
    Ok(())
}

pub async fn settings(client: &PraxisClient, command: SettingsCommand) -> Result<()> {
    match command {
        SettingsCommand::Show => print_json(&client.settings().get().await?),
        SettingsCommand::Update { json } => {
            let partial: Settings =
                serde_json::from_str(&json).wrap_err("settings must be a JSON object")?;
            print_json(&client.settings().update(&partial).await?)
        }
    }
}
