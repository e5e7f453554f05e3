//! counselflow-notify - command-line notification client
//!
//! Connects to the notification socket and prints notifications as they
//! arrive. Configuration comes from `COUNSELFLOW_*` environment variables.
//! The token is read from `COUNSELFLOW_TOKEN` and stored for later runs;
//! without it the stored `access_token` is used. `COUNSELFLOW_TOPICS` is a
//! comma-separated list of rooms to subscribe to after each connect.

#[cfg(not(target_arch = "wasm32"))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    native::run().await
}

#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use anyhow::bail;
    use counselflow_client::storage::{self, StaticTokenProvider, StorageTokenProvider, TokenProvider};
    use counselflow_client::{
        log_info, log_warn, logging, ClientConfig, NotificationDispatcher, NotificationFeed,
    };
    use counselflow_shared::Notification;

    pub async fn run() -> anyhow::Result<()> {
        logging::init();

        let config = ClientConfig::from_env()?;
        let from_env = std::env::var("COUNSELFLOW_TOKEN")
            .ok()
            .and_then(|t| StaticTokenProvider::new(t).token());
        if let Some(token) = &from_env {
            // Remembered for later runs without the variable
            if !storage::save_string(storage::TOKEN_KEY, token) {
                log_warn!("Could not persist the access token");
            }
        }
        let token = from_env.or_else(|| StorageTokenProvider::default().token());
        let Some(token) = token else {
            bail!("no token: set COUNSELFLOW_TOKEN or store one under access_token");
        };
        let topics: Vec<String> = std::env::var("COUNSELFLOW_TOPICS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect();

        let dispatcher = NotificationDispatcher::platform(&config, StaticTokenProvider::new(token));
        let mut feed = dispatcher.feed();
        let mut state = dispatcher.connection_changes();
        let mut newest: Option<String> = None;

        dispatcher.connect();

        loop {
            tokio::select! {
                changed = feed.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    newest = print_new(&feed.borrow_and_update(), newest);
                }
                changed = state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = *state.borrow_and_update();
                    log_info!("Connection {}", current);
                    if current.is_connected() {
                        for topic in &topics {
                            if !dispatcher.subscribe_to_topic(topic) {
                                log_warn!("Could not subscribe to {}", topic);
                            }
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    log_info!("Interrupted, closing connection");
                    break;
                }
            }
        }

        dispatcher.disconnect();
        Ok(())
    }

    /// Print records newer than `seen`; returns the new newest id.
    fn print_new(feed: &NotificationFeed, seen: Option<String>) -> Option<String> {
        let fresh: Vec<&Notification> = feed
            .iter()
            .take_while(|n| Some(&n.id) != seen.as_ref())
            .collect();
        for n in fresh.iter().rev() {
            let link = n.action_url.as_deref().unwrap_or("-");
            println!(
                "[{:?}/{:?}] {}: {} ({})",
                n.kind, n.priority, n.title, n.body, link
            );
        }
        feed.iter().next().map(|n| n.id.clone()).or(seen)
    }
}
