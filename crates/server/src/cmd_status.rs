//! `muxdeck status` - check a running server and list its sessions.

use std::time::Duration;

use anyhow::Context;
use muxdeck_protocol::SessionSnapshot;

use crate::VERSION;

pub async fn run(url: &str) -> anyhow::Result<()> {
    let base = url.trim_end_matches('/');
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(3))
        .build()?;

    println!();
    println!("  muxdeck v{}", VERSION);

    let health = client.get(format!("{base}/health")).send().await;
    match health {
        Ok(resp) if resp.status().is_success() => println!("  Health: OK ({base}/health)"),
        Ok(resp) => {
            println!("  Health: HTTP {}", resp.status());
            println!();
            return Ok(());
        }
        Err(_) => {
            println!("  Health: unreachable ({base})");
            println!();
            println!("  Server is not running.");
            println!("  Start with: muxdeck start");
            println!();
            return Ok(());
        }
    }

    let sessions: Vec<SessionSnapshot> = client
        .get(format!("{base}/api/sessions"))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await
        .context("decoding /api/sessions")?;

    println!("  Sessions: {}", sessions.len());
    for session in &sessions {
        println!("    {}", format_session_line(session));
    }
    println!();
    Ok(())
}

/// `name  status  [model]  turns  $cost  tokens  [approval pending]`
pub fn format_session_line(session: &SessionSnapshot) -> String {
    let state = &session.state;
    let mut line = format!("{:<20} {:<18}", state.name, state.status.as_str());
    if !session.connected {
        line.push_str(" (offline)");
    }
    if let Some(model) = &state.model {
        line.push_str(&format!(" {model}"));
    }
    line.push_str(&format!(
        " turns={} cost=${:.4} tokens={}",
        state.turn_count,
        state.total_cost_usd,
        state.total_usage.total()
    ));
    if let Some(approval) = &state.pending_tool_approval {
        line.push_str(&format!(" approval pending: {}", approval.tool_name));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use muxdeck_protocol::{PendingToolApproval, SessionState, SessionStatus};

    #[test]
    fn line_includes_status_model_and_cost() {
        let mut state = SessionState::new("alpha");
        state.status = SessionStatus::WaitingForInput;
        state.model = Some("claude-sonnet".into());
        state.turn_count = 3;
        state.total_cost_usd = 0.0125;
        state.total_usage.input_tokens = 40;
        state.total_usage.output_tokens = 2;
        state.pending_tool_approval = Some(PendingToolApproval {
            request_id: "r1".into(),
            tool_name: "Bash".into(),
            tool_input: serde_json::json!({}),
            tool_use_id: None,
            received_at: 0,
        });
        let line = format_session_line(&SessionSnapshot {
            state,
            connected: true,
        });
        assert!(line.starts_with("alpha"));
        assert!(line.contains("waiting_for_input"));
        assert!(line.contains("claude-sonnet"));
        assert!(line.contains("turns=3 cost=$0.0125 tokens=42"));
        assert!(line.contains("approval pending: Bash"));
        assert!(!line.contains("offline"));
    }

    #[test]
    fn offline_sessions_are_marked() {
        let mut state = SessionState::new("beta");
        state.status = SessionStatus::Disconnected;
        let line = format_session_line(&SessionSnapshot {
            state,
            connected: false,
        });
        assert!(line.contains("disconnected"));
        assert!(line.ends_with("(offline) turns=0 cost=$0.0000 tokens=0"));
    }
}
