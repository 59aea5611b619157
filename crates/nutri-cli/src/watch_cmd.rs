//! `nutri watch` command: print push-channel frames until interrupted.

use anyhow::Result;

use nutri_api::{EventFrame, GenerationClient};

/// One line per frame: a compact summary for agent events, the raw body
/// for anything else.
pub fn describe_frame(frame: &EventFrame) -> String {
    if let Some(event) = frame.agent_event() {
        let mut line = format!("[{}]", event.event);
        if let Some(task_id) = event.task_id() {
            line.push_str(&format!(" task={task_id}"));
        }
        if let Some(corr) = &event.correlation_id {
            line.push_str(&format!(" correlation={corr}"));
        }
        if let Some(profile) = &event.profile_id {
            line.push_str(&format!(" profile={profile}"));
        }
        if let Some(plan) = event.payload.as_ref().and_then(|p| p.plan.as_ref()) {
            line.push_str(&format!(" plan={}", plan.id));
        }
        return line;
    }
    match frame {
        EventFrame::Json(value) => format!("[json] {value}"),
        EventFrame::Raw(text) => format!("[raw] {text}"),
    }
}

/// Run the watch command. Only frames whose task or correlation id equals
/// `filter` are shown when a filter is given.
pub async fn run_watch(client: &dyn GenerationClient, filter: Option<&str>) -> Result<()> {
    let mut subscription = client.subscribe_events();
    println!("Watching agent events (Ctrl-C to stop)...");

    loop {
        tokio::select! {
            frame = subscription.next() => {
                let Some(frame) = frame else {
                    tracing::warn!("event stream closed");
                    break;
                };
                if matches_filter(&frame, filter) {
                    println!("{}", describe_frame(&frame));
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    subscription.unsubscribe();
    Ok(())
}

fn matches_filter(frame: &EventFrame, filter: Option<&str>) -> bool {
    let Some(wanted) = filter else {
        return true;
    };
    frame.agent_event().is_some_and(|event| {
        event.task_id() == Some(wanted) || event.correlation_id.as_deref() == Some(wanted)
    })
}
