use std::sync::Arc;

use framebridge_envelope::{placement_from_address, query_param, ORIGIN_PARAM};
use framebridge_peer::{GuestEndpoint, HostConfig, HostEndpoint};
use framebridge_transport::{origin_of, FrameElement, MessageBus, Window, OPAQUE_ORIGIN};
use serde::Serialize;

use crate::cmd::InspectArgs;
use crate::exit::{transport_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{or_dash, print_json, table, OutputFormat};

/// Blank document the probe host runs in.
const PROBE_HOST: &str = "about:blank";

#[derive(Serialize)]
struct InspectOutput {
    schema_id: &'static str,
    frame_src: String,
    peer_origin: Option<String>,
    placement: Option<String>,
    declared_origin: Option<String>,
    hostable: bool,
    host_error: Option<String>,
    guestable: bool,
    guest_error: Option<String>,
}

pub fn run(args: InspectArgs, format: OutputFormat) -> CliResult<i32> {
    let out = inspect(&args.frame_src)?;
    print_inspect(&out, format);

    match &out.host_error {
        None => Ok(SUCCESS),
        Some(reason) => Err(CliError::new(
            DATA_INVALID,
            format!("frame address cannot back a host: {reason}"),
        )),
    }
}

fn inspect(frame_src: &str) -> CliResult<InspectOutput> {
    let bus = MessageBus::new();
    let probe = bus
        .open_window(PROBE_HOST)
        .map_err(|err| transport_error("open probe window", err))?;

    let host_error = HostEndpoint::new(
        Arc::new(probe.clone()),
        HostConfig::new(FrameElement::detached(frame_src)),
    )
    .err()
    .map(|err| err.to_string());

    let guest_error = match bus.open_frame(probe.id(), frame_src) {
        Ok((window, _)) => GuestEndpoint::new(Arc::new(window), |_, _| {})
            .err()
            .map(|err| err.to_string()),
        Err(err) => Some(err.to_string()),
    };

    Ok(InspectOutput {
        schema_id: "https://schemas.3leaps.dev/framebridge/cli/v1/frame-inspect.schema.json",
        frame_src: frame_src.to_string(),
        peer_origin: origin_of(frame_src)
            .ok()
            .filter(|origin| origin != OPAQUE_ORIGIN),
        placement: placement_from_address(frame_src).ok().flatten(),
        declared_origin: query_param(frame_src, ORIGIN_PARAM).ok().flatten(),
        hostable: host_error.is_none(),
        host_error,
        guestable: guest_error.is_none(),
        guest_error,
    })
}

fn print_inspect(out: &InspectOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut table = table(vec!["FIELD", "VALUE"]);
            table
                .add_row(vec!["frame_src".to_string(), out.frame_src.clone()])
                .add_row(vec![
                    "peer_origin".to_string(),
                    or_dash(out.peer_origin.as_deref()),
                ])
                .add_row(vec![
                    "placement".to_string(),
                    or_dash(out.placement.as_deref()),
                ])
                .add_row(vec![
                    "declared_origin".to_string(),
                    or_dash(out.declared_origin.as_deref()),
                ])
                .add_row(vec![
                    "host".to_string(),
                    verdict(out.hostable, out.host_error.as_deref()),
                ])
                .add_row(vec![
                    "guest".to_string(),
                    verdict(out.guestable, out.guest_error.as_deref()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("Frame:");
            println!("  Address:          {}", out.frame_src);
            println!("  Peer origin:      {}", or_dash(out.peer_origin.as_deref()));
            println!("  Placement:        {}", or_dash(out.placement.as_deref()));
            println!("  Declared origin:  {}", or_dash(out.declared_origin.as_deref()));
            println!(
                "  Host:             {}",
                verdict(out.hostable, out.host_error.as_deref())
            );
            println!(
                "  Guest:            {}",
                verdict(out.guestable, out.guest_error.as_deref())
            );
        }
    }
}

fn verdict(ok: bool, error: Option<&str>) -> String {
    match (ok, error) {
        (true, _) => "ok".to_string(),
        (false, Some(reason)) => format!("fails: {reason}"),
        (false, None) => "fails".to_string(),
    }
}
