use std::env;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use tracing::{debug, info};
use url::Url;

use crate::error::CadpropError;
use crate::settings::TelemetrySettings;

/// Identity document PUT to the remote key-value endpoint on every beat.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineIdentity {
    pub machine: String,
    pub user: String,
    pub os: String,
    pub app_version: String,
    pub timestamp: String,
}

impl MachineIdentity {
    pub fn capture(app_version: &str) -> Self {
        Self {
            machine: machine_name(),
            user: env::var("USERNAME")
                .or_else(|_| env::var("USER"))
                .unwrap_or_else(|_| "unknown".to_string()),
            os: env::consts::OS.to_string(),
            app_version: app_version.to_string(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

fn machine_name() -> String {
    env::var("COMPUTERNAME")
        .or_else(|_| env::var("HOSTNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

struct Shared {
    stopped: Mutex<bool>,
    wake: Condvar,
}

/// Background reporter that periodically PUTs [`MachineIdentity`] JSON to the
/// configured endpoint. Delivery failures are logged at DEBUG and swallowed;
/// the heartbeat is never on any workflow's failure path.
pub struct Heartbeat {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl Heartbeat {
    /// Spawns the reporter thread. Fails only on a malformed endpoint or a
    /// spawn error; everything after that is fire-and-forget.
    pub fn start(settings: &TelemetrySettings, app_version: &str) -> Result<Self, CadpropError> {
        let endpoint = Url::parse(&settings.endpoint)
            .map_err(|err| CadpropError::Validation(format!("telemetry endpoint: {err}")))?;
        let interval = Duration::from_secs(settings.interval_secs.max(1));
        let app_version = app_version.to_string();

        let shared = Arc::new(Shared {
            stopped: Mutex::new(false),
            wake: Condvar::new(),
        });
        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("cadprop-heartbeat".to_string())
            .spawn(move || run(thread_shared, endpoint, interval, app_version))?;

        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    /// Signals the reporter thread and waits for it to finish.
    pub fn stop(self) {
        // Drop does the work.
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        *self.shared.stopped.lock() = true;
        self.shared.wake.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run(shared: Arc<Shared>, endpoint: Url, interval: Duration, app_version: String) {
    let agent = ureq::AgentBuilder::new()
        .timeout_read(Duration::from_secs(15))
        .timeout_write(Duration::from_secs(15))
        .build();
    info!(endpoint = %endpoint, "telemetry heartbeat started");

    loop {
        let identity = MachineIdentity::capture(&app_version);
        if let Err(err) = put_identity(&agent, &endpoint, &identity) {
            debug!(%err, "heartbeat delivery failed");
        }

        let mut stopped = shared.stopped.lock();
        if *stopped {
            break;
        }
        let _ = shared.wake.wait_for(&mut stopped, interval);
        if *stopped {
            break;
        }
    }

    debug!("telemetry heartbeat stopped");
}

fn put_identity(
    agent: &ureq::Agent,
    base: &Url,
    identity: &MachineIdentity,
) -> Result<(), CadpropError> {
    let url = identity_url(base, &identity.machine)?;
    let body = serde_json::to_string(identity)?;
    agent
        .put(url.as_str())
        .set("Content-Type", "application/json")
        .send_string(&body)
        .map_err(|err| CadpropError::Connection(format!("heartbeat PUT failed: {err}")))?;
    Ok(())
}

/// `{base}/machines/{name}.json`: the store's key-value addressing scheme,
/// where PUT replaces the whole value under the key.
fn identity_url(base: &Url, machine: &str) -> Result<Url, CadpropError> {
    let mut url = base.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|()| CadpropError::Validation("endpoint cannot be a base URL".to_string()))?;
        segments
            .pop_if_empty()
            .push("machines")
            .push(&format!("{machine}.json"));
    }
    Ok(url)
}
