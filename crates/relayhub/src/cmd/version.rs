use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("relayhub {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: relayhub");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("RELAYHUB_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "profile: {}",
        option_env!("RELAYHUB_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "defaults: max_content={} spill_threshold={} read_buffer={}",
        relayhub_frame::DEFAULT_MAX_CONTENT,
        relayhub_frame::DEFAULT_FAST_BUFFERING_THRESHOLD,
        relayhub_frame::DEFAULT_BUFFER_SIZE
    );
    println!(
        "features: hub={}, cli=true, unix_sockets={}",
        cfg!(feature = "hub"),
        cfg!(unix)
    );

    Ok(SUCCESS)
}
