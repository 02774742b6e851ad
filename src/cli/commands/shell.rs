// Interactive session: every input line counts as user activity, a background
// heartbeat keeps the token fresh while the user is active, and a forced
// logout ends the shell with the reauthentication message.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::cli::config::open_session;
use crate::cli::OutputFormat;
use crate::client::{ActivityKind, ActivityOutcome, InactivityMonitor, MonitorSettings, Session, SessionEvent};
use crate::config::config;
use crate::resources::Resource;

const HELP: &str = "\
Commands:
  me                      show the signed-in user
  ls <resource>           list records (riscos, planos-acao, ...)
  get <resource> <id>     show one record
  dashboard               show the dashboard KPIs
  help                    this text
  exit                    leave the shell";

enum Step {
    Continue,
    Exit,
}

async fn run_line(session: &Session, line: &str) -> anyhow::Result<Step> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let client = session.client();

    match parts.as_slice() {
        [] => {}
        ["exit" | "quit"] => return Ok(Step::Exit),
        ["help"] => println!("{}", HELP),
        ["me"] => {
            let user = session.refresh_user().await?;
            println!("{} <{}> role={}", user.first_name, user.email, user.role);
        }
        ["ls", raw] => {
            let resource = Resource::from_path(raw).ok_or_else(|| anyhow::anyhow!("Unknown resource '{}'", raw))?;
            let body = client.get(&format!("{}/", resource.path())).await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        ["get", raw, id] => {
            let resource = Resource::from_path(raw).ok_or_else(|| anyhow::anyhow!("Unknown resource '{}'", raw))?;
            let id: i64 = id.parse().map_err(|_| anyhow::anyhow!("Invalid id '{}'", id))?;
            let body = client.get(&format!("{}/{}/", resource.path(), id)).await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        ["dashboard"] => {
            let body = client.get("dashboard/").await?;
            println!("{}", serde_json::to_string_pretty(&body["kpis"])?);
        }
        _ => println!("Unknown command. Type 'help'."),
    }
    Ok(Step::Continue)
}

pub async fn handle(_output_format: OutputFormat) -> anyhow::Result<()> {
    let session = open_session().await?;
    let Some(user) = session.bootstrap().await else {
        anyhow::bail!("Not logged in. Run 'camaleao auth login <email>' first");
    };
    println!("Signed in as {}. Type 'help' for commands.", user.email);

    let settings = &config().client;
    let monitor: Arc<InactivityMonitor> =
        InactivityMonitor::new(session.client().clone(), MonitorSettings::from(settings));
    let heartbeat = monitor.spawn(settings.heartbeat());
    let mut events = session.client().events().subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            event = events.recv() => {
                if let Ok(SessionEvent::ReauthRequired { message, .. }) = event {
                    println!("{}", message);
                    break;
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if monitor.record(ActivityKind::KeyPress).await == ActivityOutcome::Expired {
                    // The event arm prints the message on the next turn
                    continue;
                }
                match run_line(&session, line.trim()).await {
                    Ok(Step::Exit) => break,
                    Ok(Step::Continue) => {}
                    Err(e) => eprintln!("Error: {}", e),
                }
            }
        }
    }

    heartbeat.abort();
    Ok(())
}
