use std::sync::{Arc, Mutex, PoisonError};

use framebridge_envelope::with_bridge_params;
use framebridge_peer::{
    GuestConfig, GuestEndpoint, HandshakeState, HostConfig, HostEndpoint, RecordingScriptLoader,
};
use framebridge_schema::SchemaRegistry;
use framebridge_transport::{origin_of, MessageBus, Window};
use serde::Serialize;
use serde_json::Value;

use crate::cmd::SimulateArgs;
use crate::exit::{
    bridge_error, schema_error, transport_error, CliError, CliResult, FAILURE, SUCCESS, USAGE,
};
use crate::output::{print_json, table, OutputFormat};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum TraceEntry {
    Handshake {
        placement: String,
        listeners: Option<Vec<String>>,
        methods: Vec<String>,
        scripts: usize,
    },
    MethodCall {
        command: String,
        payload: Value,
    },
    EventSent {
        event: String,
        payload: Value,
    },
    EventDelivered {
        event: String,
        payload: Value,
    },
    Rejected {
        name: String,
        reason: String,
    },
}

#[derive(Serialize)]
struct SimulateOutput {
    schema_id: &'static str,
    frame_src: String,
    host_origin: String,
    placement: String,
    handshake: &'static str,
    delivered_messages: usize,
    scripts_loaded: Vec<String>,
    trace: Vec<TraceEntry>,
}

#[derive(Clone, Default)]
struct Trace(Arc<Mutex<Vec<TraceEntry>>>);

impl Trace {
    fn push(&self, entry: TraceEntry) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    fn entries(&self) -> Vec<TraceEntry> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

pub fn run(args: SimulateArgs, format: OutputFormat) -> CliResult<i32> {
    let invocations = parse_calls(&args.invocations, "--invoke")?;
    let emits = parse_calls(&args.emits, "--emit")?;

    let bus = MessageBus::new();
    let host_window = bus
        .open_window(&args.host)
        .map_err(|err| transport_error("open host window", err))?;
    let host_origin = host_window.origin();

    let frame_src = match &args.placement {
        Some(placement) => with_bridge_params(&args.frame_src, &host_origin, placement)
            .map_err(|err| CliError::new(USAGE, format!("--frame-src: {err}")))?,
        None => args.frame_src.clone(),
    };
    let (guest_window, frame) = bus
        .open_frame(host_window.id(), &frame_src)
        .map_err(|err| transport_error("open frame", err))?;

    let trace = Trace::default();
    let mut config = HostConfig::new(frame).with_scripts(args.scripts.iter().cloned());
    for name in &args.methods {
        let trace = trace.clone();
        let command = name.clone();
        config = config.with_method(name.as_str(), move |payload: &Value| {
            trace.push(TraceEntry::MethodCall {
                command: command.clone(),
                payload: payload.clone(),
            });
            Ok(())
        });
    }
    if !args.listeners.is_empty() {
        config = config.with_listeners(args.listeners.iter().cloned());
    }
    if let Some(dir) = &args.schemas {
        let registry = SchemaRegistry::from_directory(dir)
            .map_err(|err| schema_error(&format!("load schemas from {}", dir.display()), err))?;
        config = config.with_schema_registry(Arc::new(registry));
    }

    let host = HostEndpoint::new(Arc::new(host_window), config)
        .map_err(|err| bridge_error("host endpoint", err))?;

    let loader = RecordingScriptLoader::new();
    let on_ready = trace.clone();
    let guest = GuestEndpoint::with_config(
        Arc::new(guest_window),
        move |handshake, _| {
            on_ready.push(TraceEntry::Handshake {
                placement: handshake.placement.clone(),
                listeners: handshake.manifest.listeners.clone(),
                methods: handshake.manifest.methods.clone(),
                scripts: handshake.manifest.scripts.len(),
            });
        },
        GuestConfig::default().with_script_loader(loader.clone()),
    )
    .map_err(|err| bridge_error("guest endpoint", err))?;

    let mut delivered = bus.dispatch_pending();

    for listener in guest.listeners() {
        let trace = trace.clone();
        let event = listener.name().to_string();
        listener
            .subscribe(move |payload: &Value| {
                trace.push(TraceEntry::EventDelivered {
                    event: event.clone(),
                    payload: payload.clone(),
                });
                Ok(())
            })
            .map_err(|err| bridge_error("subscribe", err))?;
    }

    for (name, payload) in invocations {
        match guest.method(&name) {
            Some(method) => method
                .invoke(payload)
                .map_err(|err| bridge_error(&format!("invoke {name}"), err))?,
            None => trace.push(TraceEntry::Rejected {
                name,
                reason: "method not advertised by host".to_string(),
            }),
        }
        delivered += bus.dispatch_pending();
    }

    for (name, payload) in emits {
        match host.send(&name, payload.clone()) {
            Ok(()) => trace.push(TraceEntry::EventSent {
                event: name,
                payload,
            }),
            Err(err) => trace.push(TraceEntry::Rejected {
                name,
                reason: err.to_string(),
            }),
        }
        delivered += bus.dispatch_pending();
    }

    let state = guest.handshake_state();
    let out = SimulateOutput {
        schema_id: "https://schemas.3leaps.dev/framebridge/cli/v1/simulation-trace.schema.json",
        frame_src,
        host_origin,
        placement: host.placement().to_string(),
        handshake: state_name(state),
        delivered_messages: delivered,
        scripts_loaded: loader.loaded(),
        trace: trace.entries(),
    };
    print_simulation(&out, format);

    guest.destroy();
    host.destroy();

    if state != HandshakeState::Ready {
        let expected = origin_of(&out.frame_src).unwrap_or_default();
        return Err(CliError::new(
            FAILURE,
            format!(
                "guest never completed the handshake (host {} -> frame {expected}); check _origin",
                out.host_origin
            ),
        ));
    }
    Ok(SUCCESS)
}

/// Parse repeated `NAME[=JSON]` arguments. A missing payload is `null`.
fn parse_calls(raw: &[String], flag: &str) -> CliResult<Vec<(String, Value)>> {
    raw.iter().map(|item| parse_call(item, flag)).collect()
}

fn parse_call(raw: &str, flag: &str) -> CliResult<(String, Value)> {
    let (name, payload) = match raw.split_once('=') {
        Some((name, json)) => {
            let payload = serde_json::from_str(json).map_err(|err| {
                CliError::new(USAGE, format!("{flag} {name}: payload is not valid JSON: {err}"))
            })?;
            (name, payload)
        }
        None => (raw, Value::Null),
    };
    let name = name.trim();
    if name.is_empty() {
        return Err(CliError::new(USAGE, format!("{flag}: name must not be empty")));
    }
    Ok((name.to_string(), payload))
}

fn state_name(state: HandshakeState) -> &'static str {
    match state {
        HandshakeState::Pending => "pending",
        HandshakeState::Ready => "ready",
        HandshakeState::TimedOut => "timed_out",
    }
}

fn print_simulation(out: &SimulateOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut table = table(vec!["STEP", "KIND", "NAME", "DETAIL"]);
            for (step, entry) in out.trace.iter().enumerate() {
                let (kind, name, detail) = describe(entry);
                table.add_row(vec![(step + 1).to_string(), kind.to_string(), name, detail]);
            }
            println!(
                "placement={} handshake={} delivered={}",
                out.placement, out.handshake, out.delivered_messages
            );
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("Simulation:");
            println!("  Host origin:      {}", out.host_origin);
            println!("  Frame:            {}", out.frame_src);
            println!("  Placement:        {}", out.placement);
            println!("  Handshake:        {}", out.handshake);
            println!("  Delivered:        {}", out.delivered_messages);
            println!("  Scripts loaded:   {}", out.scripts_loaded.len());
            for entry in &out.trace {
                let (kind, name, detail) = describe(entry);
                println!("  {kind:<16} {name} {detail}");
            }
        }
    }
}

fn describe(entry: &TraceEntry) -> (&'static str, String, String) {
    match entry {
        TraceEntry::Handshake {
            placement,
            listeners,
            methods,
            scripts,
        } => (
            "handshake",
            placement.clone(),
            format!(
                "listeners={} methods=[{}] scripts={scripts}",
                listeners
                    .as_ref()
                    .map_or_else(|| "unrestricted".to_string(), |names| format!("[{}]", names.join(","))),
                methods.join(",")
            ),
        ),
        TraceEntry::MethodCall { command, payload } => {
            ("method_call", command.clone(), payload.to_string())
        }
        TraceEntry::EventSent { event, payload } => ("event_sent", event.clone(), payload.to_string()),
        TraceEntry::EventDelivered { event, payload } => {
            ("event_delivered", event.clone(), payload.to_string())
        }
        TraceEntry::Rejected { name, reason } => ("rejected", name.clone(), reason.clone()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parse_call_with_and_without_payload() {
        assert_eq!(
            parse_call("increment={\"by\":2}", "--invoke").unwrap(),
            ("increment".to_string(), json!({"by": 2}))
        );
        assert_eq!(
            parse_call("reset", "--invoke").unwrap(),
            ("reset".to_string(), Value::Null)
        );
    }

    #[test]
    fn parse_call_rejects_bad_input() {
        assert_eq!(parse_call("=1", "--emit").unwrap_err().code, USAGE);
        assert_eq!(parse_call("x={nope", "--emit").unwrap_err().code, USAGE);
    }

    #[test]
    fn trace_entries_serialize_with_kind_tag() {
        let entry = TraceEntry::MethodCall {
            command: "increment".to_string(),
            payload: json!(1),
        };
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            json!({"kind": "method_call", "command": "increment", "payload": 1})
        );
    }

    #[test]
    fn describe_unrestricted_handshake() {
        let (kind, name, detail) = describe(&TraceEntry::Handshake {
            placement: "P".to_string(),
            listeners: None,
            methods: vec!["a".to_string(), "b".to_string()],
            scripts: 0,
        });
        assert_eq!(kind, "handshake");
        assert_eq!(name, "P");
        assert_eq!(detail, "listeners=unrestricted methods=[a,b] scripts=0");
    }
}
