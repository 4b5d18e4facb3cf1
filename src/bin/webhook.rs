//! Admission webhook server for ChangeTriggeredJob resources.
//!
//! Serves the mutating (defaulting) and validating webhooks over HTTPS
//! with certificates mounted by Kubernetes. The defaulting and validation
//! policies themselves live in the library; this binary is the TLS and
//! HTTP plumbing plus the dry-run job-template check, which needs an API
//! client.

use bytes::Bytes;
use changejob_operator::controller::jobs;
use changejob_operator::error::OperatorError;
use changejob_operator::webhook::{
    self, AdmissionRequest, AdmissionReview, response_allowed, response_denied, response_patched,
    review_response,
};
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, Response, StatusCode};
use kube::Client;
use std::convert::Infallible;
use std::env;
use std::net::SocketAddr;
use tokio::fs;
use tracing::{error, info};

/// Default webhook server port (HTTPS)
const DEFAULT_WEBHOOK_PORT: u16 = 8443;

/// Default TLS certificate path (mounted by Kubernetes)
const DEFAULT_TLS_CERT_PATH: &str = "/certs/tls.crt";

/// Default TLS private key path (mounted by Kubernetes)
const DEFAULT_TLS_KEY_PATH: &str = "/certs/tls.key";

/// Mutating webhook path.
const MUTATE_PATH: &str = "/mutate-triggers-changejob-dev-v1alpha-changetriggeredjob";

/// Validating webhook path.
const VALIDATE_PATH: &str = "/validate-triggers-changejob-dev-v1alpha-changetriggeredjob";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("ChangeTriggeredJob webhook server starting...");

    let port: u16 = env::var("WEBHOOK_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_WEBHOOK_PORT);

    let tls_cert = env::var("TLS_CERT_FILE").unwrap_or_else(|_| DEFAULT_TLS_CERT_PATH.to_string());
    let tls_key = env::var("TLS_KEY_FILE").unwrap_or_else(|_| DEFAULT_TLS_KEY_PATH.to_string());

    info!(
        port = port,
        tls_cert = %tls_cert,
        tls_key = %tls_key,
        "Webhook configuration loaded"
    );

    let cert_pem = fs::read(&tls_cert).await?;
    let key_pem = fs::read(&tls_key).await?;

    let certs = rustls_pemfile::certs(&mut cert_pem.as_slice()).collect::<Result<Vec<_>, _>>()?;
    let key = rustls_pemfile::private_key(&mut key_pem.as_slice())?
        .ok_or("No private key found in PEM file")?;

    let mut tls_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    tls_config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    let tls_acceptor = tokio_rustls::TlsAcceptor::from(std::sync::Arc::new(tls_config));

    // Client for the dry-run job-template check.
    let client = Client::try_default().await?;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(addr = %addr, "Webhook server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    loop {
        let (stream, _peer_addr) = listener.accept().await?;
        let acceptor = tls_acceptor.clone();
        let client = client.clone();

        tokio::spawn(async move {
            match acceptor.accept(stream).await {
                Ok(tls_stream) => {
                    let io = hyper_util::rt::TokioIo::new(tls_stream);
                    let service = hyper::service::service_fn(move |req| {
                        handle_request(req, client.clone())
                    });

                    if let Err(e) = hyper::server::conn::http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        error!(error = %e, "Connection error");
                    }
                }
                Err(e) => {
                    error!(error = %e, "TLS handshake failed");
                }
            }
        });
    }
}

/// Route incoming HTTP requests.
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    client: Client,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::POST, MUTATE_PATH) => Ok(mutate(req).await),
        (&Method::POST, VALIDATE_PATH) => Ok(validate(req, client).await),
        (&Method::GET, "/healthz") => Ok(build_response(StatusCode::OK, "OK")),
        (&Method::GET, "/readyz") => Ok(build_response(StatusCode::OK, "Ready")),
        _ => Ok(build_response(StatusCode::NOT_FOUND, "Not Found")),
    }
}

/// Mutating webhook: compute and attach the defaulting patch.
async fn mutate(req: Request<hyper::body::Incoming>) -> Response<Full<Bytes>> {
    let request = match read_admission_request(req).await {
        Ok(request) => request,
        Err(response) => return response,
    };

    let response = match &request.object {
        Some(trigger) => {
            info!(
                name = trigger.metadata.name.as_deref().unwrap_or("<unnamed>"),
                operation = %request.operation,
                "Defaulting ChangeTriggeredJob"
            );
            let ops = webhook::defaulting_patch(trigger, chrono::Utc::now());
            match response_patched(request.uid.clone(), &ops) {
                Ok(response) => response,
                Err(e) => {
                    error!(error = %e, "Failed to encode defaulting patch");
                    return error_response("Failed to encode patch");
                }
            }
        }
        // No object on the request (e.g. DELETE): nothing to default.
        None => response_allowed(request.uid),
    };

    encode_review(review_response(response))
}

/// Validating webhook: structural checks plus the dry-run template check.
async fn validate(req: Request<hyper::body::Incoming>, client: Client) -> Response<Full<Bytes>> {
    let request = match read_admission_request(req).await {
        Ok(request) => request,
        Err(response) => return response,
    };

    let Some(trigger) = &request.object else {
        return encode_review(review_response(response_allowed(request.uid)));
    };

    let name = trigger.metadata.name.as_deref().unwrap_or("<unnamed>");
    info!(name = name, operation = %request.operation, "Validating ChangeTriggeredJob");

    if let Err(message) = webhook::validate(trigger) {
        info!(name = name, reason = %message, "Rejected ChangeTriggeredJob");
        return encode_review(review_response(response_denied(request.uid, message)));
    }

    if let Err(e) = jobs::validate_job_template(&client, trigger).await {
        let message = match e {
            OperatorError::InvalidJobTemplate(detail) => {
                format!("spec.jobTemplate: {detail}")
            }
            other => format!("unable to verify jobTemplate: {other}"),
        };
        info!(name = name, reason = %message, "Rejected ChangeTriggeredJob");
        return encode_review(review_response(response_denied(request.uid, message)));
    }

    encode_review(review_response(response_allowed(request.uid)))
}

/// Read and parse the body of an incoming AdmissionReview.
async fn read_admission_request(
    req: Request<hyper::body::Incoming>,
) -> Result<AdmissionRequest, Response<Full<Bytes>>> {
    let body_bytes = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            error!(error = %e, "Failed to read request body");
            return Err(error_response("Failed to read request body"));
        }
    };

    let review: AdmissionReview = match serde_json::from_slice(&body_bytes) {
        Ok(review) => review,
        Err(e) => {
            error!(error = %e, "Failed to parse AdmissionReview");
            return Err(error_response("Invalid AdmissionReview format"));
        }
    };

    review.request.ok_or_else(|| {
        error!("AdmissionReview missing request");
        error_response("Missing request in AdmissionReview")
    })
}

/// Serialize an outgoing AdmissionReview.
fn encode_review(review: AdmissionReview) -> Response<Full<Bytes>> {
    match serde_json::to_string(&review) {
        Ok(json) => Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "application/json")
            .body(Full::new(Bytes::from(json)))
            .unwrap_or_else(|e| {
                error!(error = %e, "Failed to build admission review response");
                error_response("Failed to build response")
            }),
        Err(e) => {
            error!(error = %e, "Failed to serialize response");
            error_response("Failed to serialize response")
        }
    }
}

/// Build a plain response, falling back to a minimal 200 body if the
/// builder rejects the parts.
fn build_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(body.into()))
        .unwrap_or_else(|e| {
            error!(error = %e, "Failed to build response");
            Response::new(Full::new(Bytes::from("Internal Error")))
        })
}

/// Error response
fn error_response(message: &str) -> Response<Full<Bytes>> {
    build_response(StatusCode::BAD_REQUEST, message.to_string())
}
