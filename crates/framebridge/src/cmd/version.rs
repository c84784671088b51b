use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

const NAME: &str = "framebridge";

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("{NAME} {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    for (key, value) in provenance() {
        println!("{key}: {value}");
    }
    Ok(SUCCESS)
}

fn provenance() -> Vec<(&'static str, String)> {
    let build = |value: Option<&'static str>| value.unwrap_or("unknown").to_string();
    vec![
        ("name", NAME.to_string()),
        ("version", env!("CARGO_PKG_VERSION").to_string()),
        ("build_target", build(option_env!("FRAMEBRIDGE_BUILD_TARGET"))),
        ("build_profile", build(option_env!("FRAMEBRIDGE_BUILD_PROFILE"))),
        ("git_hash", build(option_env!("GIT_HASH"))),
        (
            "features",
            format!(
                "peer={}, schema={}, cli=true",
                cfg!(feature = "peer"),
                cfg!(feature = "schema")
            ),
        ),
        (
            "handshake",
            framebridge_envelope::READY_COMMAND.to_string(),
        ),
        (
            "address_params",
            format!(
                "{},{}",
                framebridge_envelope::ORIGIN_PARAM,
                framebridge_envelope::PLACEMENT_PARAM
            ),
        ),
    ]
}
