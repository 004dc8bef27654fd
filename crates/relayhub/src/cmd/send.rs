use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use relayhub_frame::{Channel, Content, FrameReader, FrameWriter, Verb};
use relayhub_transport::Transport;

use crate::cmd::SendArgs;
use crate::exit::{
    frame_error, io_error, transport_error, CliError, CliResult, SUCCESS, TIMEOUT, USAGE,
};
use crate::output::{print_message, OutputFormat};

pub async fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let verb = Verb::new(&args.verb)
        .map_err(|err| CliError::new(USAGE, format!("--verb {:?}: {err}", args.verb)))?;
    let channel: Channel = args
        .channel
        .parse()
        .map_err(|err| CliError::new(USAGE, format!("--channel {:?}: {err}", args.channel)))?;
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let mut content = resolve_content(&args).await?;

    let transport = connect(&args).await?;
    let mut writer = FrameWriter::new(Arc::clone(&transport));
    writer
        .send(&verb, channel, &mut content)
        .await
        .map_err(|err| frame_error("send failed", err))?;

    if args.wait {
        let mut reader = FrameReader::new(Arc::clone(&transport));
        let mut message = tokio::time::timeout(wait_timeout, reader.read_message())
            .await
            .map_err(|_| {
                CliError::new(
                    TIMEOUT,
                    format!("no message received within {}", args.wait_timeout),
                )
            })?
            .map_err(|err| frame_error("receive failed", err))?;
        print_message(&mut message, format).await?;
    }

    transport.dispose().await;
    Ok(SUCCESS)
}

async fn connect(args: &SendArgs) -> CliResult<Arc<dyn Transport>> {
    if let Some(addr) = &args.tcp {
        let transport = relayhub_transport::tcp::connect(addr.as_str())
            .await
            .map_err(|err| transport_error("connect failed", err))?;
        return Ok(Arc::new(transport));
    }
    if let Some(path) = &args.unix {
        return connect_unix(path).await;
    }
    Err(CliError::new(USAGE, "one of --tcp or --unix is required"))
}

#[cfg(unix)]
async fn connect_unix(path: &Path) -> CliResult<Arc<dyn Transport>> {
    let transport = relayhub_transport::uds::connect(path)
        .await
        .map_err(|err| transport_error("connect failed", err))?;
    Ok(Arc::new(transport))
}

#[cfg(not(unix))]
async fn connect_unix(path: &Path) -> CliResult<Arc<dyn Transport>> {
    Err(CliError::new(
        USAGE,
        format!(
            "--unix {} is not supported on this platform",
            path.display()
        ),
    ))
}

/// Data is sent from memory; files are streamed without loading them.
async fn resolve_content(args: &SendArgs) -> CliResult<Content> {
    if let Some(data) = &args.data {
        return Ok(Content::from(data.clone()));
    }
    if let Some(path) = &args.file {
        let context = format!("failed reading {}", path.display());
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|err| io_error(&context, err))?;
        let len = file
            .metadata()
            .await
            .map_err(|err| io_error(&context, err))?
            .len();
        return Ok(Content::from_reader(file, len));
    }
    Ok(Content::empty())
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = match input.strip_suffix("ms") {
        Some(number) => (number, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
