//! One master session: spawn modules, ask, collect, shut down.

use std::time::{Duration, Instant};

use fip::{CompileTarget, Master, Message, SlaveResponse};
use fip_signature::FunctionSignature;
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct SessionPlan {
    pub symbols: Vec<FunctionSignature>,
    pub target: Option<CompileTarget>,
    /// How long responses are collected after each broadcast.
    pub window: Duration,
    /// How long spawned modules get to connect before the first broadcast.
    pub connect_timeout: Duration,
}

impl SessionPlan {
    pub fn new(symbols: Vec<FunctionSignature>) -> Self {
        Self {
            symbols,
            target: None,
            window: Duration::from_millis(200),
            connect_timeout: Duration::from_secs(2),
        }
    }

    pub fn with_target(mut self, target: CompileTarget) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }
}

/// A module answer in printable form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseRecord {
    Symbol {
        slot: usize,
        module: String,
        found: bool,
        symbol: String,
    },
    Object {
        slot: usize,
        module: String,
        path: String,
    },
}

impl ResponseRecord {
    /// Only module answers are reported; anything else yields `None`.
    pub fn from_response(response: &SlaveResponse) -> Option<Self> {
        match &response.message {
            Message::SymbolResponse {
                found,
                module_name,
                symbol,
            } => Some(Self::Symbol {
                slot: response.slot,
                module: module_name.to_string(),
                found: *found,
                symbol: symbol.to_string(),
            }),
            Message::ObjectResponse { module_name, path } => Some(Self::Object {
                slot: response.slot,
                module: module_name.to_string(),
                path: path.to_string(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionReport {
    pub spawned: Vec<u32>,
    pub connected: usize,
    pub responses: Vec<ResponseRecord>,
}

impl SessionReport {
    fn record(&mut self, responses: Vec<SlaveResponse>) {
        for response in &responses {
            match ResponseRecord::from_response(response) {
                Some(record) => self.responses.push(record),
                None => tracing::debug!(
                    slot = response.slot,
                    message = response.message.name(),
                    "Ignoring unexpected message"
                ),
            }
        }
    }
}

/// Drive a whole session on a bound master, ending with shutdown.
///
/// Shutdown runs even when a step fails, so modules always get Kill.
pub async fn run_session(master: &mut Master, plan: &SessionPlan) -> anyhow::Result<SessionReport> {
    let mut report = SessionReport {
        spawned: master.spawn_configured_modules(),
        ..Default::default()
    };

    let outcome = drive(master, plan, &mut report).await;
    if let Err(e) = &outcome {
        tracing::error!(error = %e, "Session failed, shutting down");
    }
    master.shutdown().await?;
    outcome?;
    Ok(report)
}

async fn drive(
    master: &mut Master,
    plan: &SessionPlan,
    report: &mut SessionReport,
) -> anyhow::Result<()> {
    let started = Instant::now();
    while master.connected() < report.spawned.len() && started.elapsed() < plan.connect_timeout {
        let early = master.collect_responses(plan.window).await;
        report.record(early);
    }
    master.accept_pending().await;
    report.connected = master.connected();
    tracing::info!(
        spawned = report.spawned.len(),
        connected = report.connected,
        "Modules ready"
    );

    for symbol in &plan.symbols {
        master
            .broadcast(&Message::symbol_request(symbol.clone()))
            .await?;
        let responses = master.collect_responses(plan.window).await;
        report.record(responses);
    }

    if let Some(target) = &plan.target {
        master
            .broadcast(&Message::CompileRequest {
                target: target.clone(),
            })
            .await?;
        let responses = master.collect_responses(plan.window).await;
        report.record(responses);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::DemoModule;
    use fip::{KillReason, MasterConfig, ModuleName, ObjectPath, SlaveClient, SlaveConfig};
    use fip_signature::parse_function_signature;

    #[test]
    fn records_render_as_tagged_json() {
        let response = SlaveResponse {
            slot: 2,
            message: Message::SymbolResponse {
                found: true,
                module_name: ModuleName::new("c").unwrap(),
                symbol: parse_function_signature("add(i32,i32)->i32")
                    .unwrap()
                    .into(),
            },
        };
        let record = ResponseRecord::from_response(&response).unwrap();
        insta::assert_json_snapshot!(record, @r#"
        {
          "kind": "symbol",
          "slot": 2,
          "module": "c",
          "found": true,
          "symbol": "add(i32,i32)->i32"
        }
        "#);

        let kill = SlaveResponse {
            slot: 0,
            message: Message::kill(KillReason::Finish),
        };
        assert!(ResponseRecord::from_response(&kill).is_none());
    }

    #[tokio::test]
    async fn session_collects_answers_from_connected_module() {
        let dir = tempfile::tempdir().unwrap();
        let config = MasterConfig::new(dir.path().join("fip.sock"))
            .with_accept_timeout(Duration::from_millis(20))
            .with_grace_period(Duration::from_millis(200));
        let mut master = Master::bind(config).await.unwrap();

        let slave = SlaveConfig::new(master.socket_path(), 1)
            .with_receive_timeout(Duration::from_millis(20))
            .with_idle_yield(Duration::from_millis(5));
        let mut client = SlaveClient::connect(slave).await.unwrap();
        let module = DemoModule::new(ModuleName::new("c").unwrap())
            .with_exports("add(i32,i32)->i32")
            .unwrap()
            .with_object(ObjectPath::new("/tmp/c.o").unwrap());
        let serving = tokio::spawn(async move { client.run(&module).await });

        let plan = SessionPlan::new(vec![
            parse_function_signature("add()").unwrap(),
            parse_function_signature("sub()").unwrap(),
        ])
        .with_target("x86_64-none-pc-linux-gnu".parse().unwrap())
        .with_window(Duration::from_millis(300));

        let report = run_session(&mut master, &plan).await.unwrap();
        assert!(report.spawned.is_empty());
        assert_eq!(report.connected, 1);
        insta::assert_json_snapshot!(report.responses, @r#"
        [
          {
            "kind": "symbol",
            "slot": 0,
            "module": "c",
            "found": true,
            "symbol": "add(i32,i32)->i32"
          },
          {
            "kind": "symbol",
            "slot": 0,
            "module": "c",
            "found": false,
            "symbol": "sub()"
          },
          {
            "kind": "object",
            "slot": 0,
            "module": "c",
            "path": "/tmp/c.o"
          }
        ]
        "#);

        assert_eq!(serving.await.unwrap().unwrap(), KillReason::Finish);
        assert!(!dir.path().join("fip.sock").exists());
    }

    #[tokio::test]
    async fn failed_broadcast_still_kills_modules() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("fip.sock");
        let config = MasterConfig::new(&socket).with_accept_timeout(Duration::from_millis(20));
        let mut master = Master::bind(config).await.unwrap();

        let mut client = SlaveClient::connect(
            SlaveConfig::new(master.socket_path(), 1).with_receive_timeout(Duration::from_millis(20)),
        )
        .await
        .unwrap();

        let mut oversized = FunctionSignature::new("big").unwrap();
        for _ in 0..255 {
            oversized = oversized
                .with_argument(fip_signature::PrimitiveType::U8)
                .unwrap()
                .with_return(fip_signature::PrimitiveType::U8)
                .unwrap();
        }
        let plan = SessionPlan::new(vec![oversized]).with_window(Duration::from_millis(50));

        let err = run_session(&mut master, &plan).await.unwrap_err();
        assert!(err.to_string().contains("1152"), "{err}");
        assert!(!socket.exists());

        let kill = client
            .receive_timeout(Duration::from_millis(500))
            .await
            .unwrap();
        assert_eq!(kill, Some(Message::kill(KillReason::Finish)));
    }
}
