use std::sync::Arc;

use relayhub_hub::{serve, Acceptor, HubConfig, HubService};
use relayhub_transport::TcpSocketListener;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cmd::ServeArgs;
use crate::exit::{
    hub_error, io_error, transport_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS,
};
use crate::output::{print_event, OutputFormat};

pub async fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let config = HubConfig::default()
        .with_receive_rate_limit(args.rate_limit)
        .with_max_content_length(args.max_content)
        .with_fast_buffering_threshold(args.spill_threshold);
    let service = HubService::new(config);

    let mut acceptors: Vec<Arc<dyn Acceptor>> = Vec::new();
    if let Some(addr) = &args.tcp {
        let listener = TcpSocketListener::bind(addr.as_str())
            .await
            .map_err(|err| transport_error("bind failed", err))?;
        acceptors.push(Arc::new(listener));
    }
    if let Some(path) = &args.unix {
        acceptors.push(bind_unix(path)?);
    }

    let printer = args.events.then(|| {
        let mut events = service.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => print_event(&event, format),
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "event output fell behind"),
                    Err(RecvError::Closed) => break,
                }
            }
        })
    });

    service.start();
    let shutdown = CancellationToken::new();
    let mut listeners = JoinSet::new();
    for acceptor in acceptors {
        let service = service.clone();
        let shutdown = shutdown.clone();
        listeners.spawn(async move { serve(&service, acceptor.as_ref(), shutdown).await });
    }

    let outcome = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(|err| io_error("signal handler setup failed", err))
        }
        Some(joined) = listeners.join_next() => Err(listener_failure(joined)),
    };

    info!("shutting down");
    shutdown.cancel();
    while let Some(joined) = listeners.join_next().await {
        if let Ok(Err(err)) = joined {
            warn!(error = %err, "listener ended with error");
        }
    }
    service.shutdown().await;
    if let Some(printer) = printer {
        printer.abort();
    }

    outcome.map(|()| SUCCESS)
}

fn listener_failure(joined: Result<relayhub_hub::Result<()>, tokio::task::JoinError>) -> CliError {
    match joined {
        Ok(Err(err)) => hub_error("listener failed", err),
        Ok(Ok(())) => CliError::new(FAILURE, "listener stopped unexpectedly"),
        Err(err) => CliError::new(INTERNAL, format!("listener task failed: {err}")),
    }
}

#[cfg(unix)]
fn bind_unix(path: &std::path::Path) -> CliResult<Arc<dyn Acceptor>> {
    let listener = relayhub_transport::UnixSocketListener::bind(path)
        .map_err(|err| transport_error("bind failed", err))?;
    Ok(Arc::new(listener))
}

#[cfg(not(unix))]
fn bind_unix(path: &std::path::Path) -> CliResult<Arc<dyn Acceptor>> {
    Err(CliError::new(
        crate::exit::USAGE,
        format!(
            "--unix {} is not supported on this platform",
            path.display()
        ),
    ))
}
