//! The TCP accept loop, optional TLS termination and per-connection
//! command processing.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{format_err, Error};
use openssl::ssl::{Ssl, SslAcceptor, SslFiletype, SslMethod};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::time::timeout;

use lily_config::TlsConfig;
use lily_protocol::{wire, ChunkChannel};

use crate::api;
use crate::server::Server;

fn make_acceptor(tls: &TlsConfig) -> Result<SslAcceptor, Error> {
    let mut acceptor = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls())
        .map_err(|err| format_err!("unable to build tls acceptor - {}", err))?;
    acceptor.set_private_key_file(&tls.key, SslFiletype::PEM)?;
    acceptor.set_certificate_chain_file(&tls.cert)?;
    acceptor.check_private_key()?;
    Ok(acceptor.build())
}

/// Run the accept loop until shutdown is requested.
///
/// Each accepted connection is serviced by its own task, but command
/// execution is gated on a permit from the bounded worker pool; overflow
/// connections queue on the semaphore.
pub async fn serve(server: Arc<Server>) -> Result<(), Error> {
    let address = format!("{}:{}", server.config.host, server.config.port);
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|err| format_err!("unable to bind {} - {}", address, err))?;
    log::info!("listening on {}", address);

    let acceptor = match &server.config.tls {
        Some(tls) => Some(Arc::new(make_acceptor(tls)?)),
        None => None,
    };

    let mut shutdown = server.state.subscribe();
    let accept_interval = match server.config.rate_limit_per_sec {
        0 => None,
        per_sec => Some(Duration::from_secs(1) / per_sec),
    };
    let mut last_accept: Option<tokio::time::Instant> = None;

    loop {
        let accepted = tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => accepted,
        };

        let (stream, peer) = match accepted {
            Ok(conn) => conn,
            Err(err) => {
                // accept can fail transiently (e.g. the peer is already gone)
                log::warn!("accept failed: {}", err);
                continue;
            }
        };

        if let Some(interval) = accept_interval {
            if let Some(last) = last_accept {
                let elapsed = last.elapsed();
                if elapsed < interval {
                    tokio::time::sleep(interval - elapsed).await;
                }
            }
            last_accept = Some(tokio::time::Instant::now());
        }

        let server = server.clone();
        let acceptor = acceptor.clone();
        tokio::spawn(async move {
            let pool = server.worker_pool();
            let _permit = match pool.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };

            let result = match acceptor {
                Some(acceptor) => {
                    match tls_accept(&acceptor, stream).await {
                        Ok(mut tls_stream) => {
                            handle_connection(&server, &mut tls_stream).await
                        }
                        Err(err) => {
                            log::warn!("tls handshake with {} failed: {}", peer, err);
                            return;
                        }
                    }
                }
                None => {
                    let mut stream = stream;
                    handle_connection(&server, &mut stream).await
                }
            };

            if let Err(err) = result {
                log::warn!("connection {}: {}", peer, err);
            }
        });
    }

    log::info!("accept loop stopped");
    Ok(())
}

async fn tls_accept(
    acceptor: &SslAcceptor,
    stream: tokio::net::TcpStream,
) -> Result<tokio_openssl::SslStream<tokio::net::TcpStream>, Error> {
    let ssl = Ssl::new(acceptor.context())?;
    let mut tls_stream = tokio_openssl::SslStream::new(ssl, stream)?;
    Pin::new(&mut tls_stream).accept().await?;
    Ok(tls_stream)
}

/// Service one connection: read framed requests, dispatch, write the
/// response. Chunked commands stream through the same socket between the
/// request header and the response.
pub async fn handle_connection<S>(server: &Arc<Server>, stream: &mut S) -> Result<(), Error>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    loop {
        if server.state.is_shutdown() {
            break;
        }

        let net_timeout = server.network_timeout();
        let request = match timeout(net_timeout, wire::read_request(stream)).await {
            Err(_) => break, // idle connection timed out
            Ok(Err(err)) => return Err(err.into()),
            Ok(Ok(None)) => break, // clean EOF
            Ok(Ok(Some(request))) => request,
        };

        let outcome = {
            let mut chunks = ChunkChannel::new(stream, server.chunk_idle_timeout());
            api::handle_request(server, request, &mut chunks).await
        };

        timeout(net_timeout, wire::write_response(stream, &outcome.response))
            .await
            .map_err(|_| format_err!("response write timed out"))??;

        if outcome.shutdown {
            // the response is flushed before the listener goes down
            server.state.request_shutdown();
            break;
        }
        if outcome.close {
            break;
        }
    }
    Ok(())
}
