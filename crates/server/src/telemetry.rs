use axum::{body::Body, http::Request, response::Response};
use opentelemetry::{
    global,
    trace::{SpanKind, TraceContextExt, Tracer},
    Context, KeyValue,
};
use opentelemetry_otlp::{WithExportConfig, WithTonicConfig};
use shared_types::GatewayUser;
use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context as TaskContext, Poll},
};
use tower::{Layer, Service};

use crate::config::GatewayConfig;
use crate::services;

const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("failed to build OTLP exporter: {0}")]
    Exporter(#[from] opentelemetry_otlp::ExporterBuildError),
    #[error("invalid SIGNOZ_INGESTION_KEY value")]
    IngestionKey,
}

fn ingestion_metadata() -> Result<Option<opentelemetry_otlp::tonic_types::metadata::MetadataMap>, TelemetryError> {
    match std::env::var("SIGNOZ_INGESTION_KEY") {
        Ok(key) if !key.is_empty() => {
            let mut metadata = opentelemetry_otlp::tonic_types::metadata::MetadataMap::new();
            metadata.insert(
                "signoz-ingestion-key",
                key.parse().map_err(|_| TelemetryError::IngestionKey)?,
            );
            Ok(Some(metadata))
        }
        _ => Ok(None),
    }
}

fn tls_config() -> opentelemetry_otlp::tonic_types::transport::ClientTlsConfig {
    opentelemetry_otlp::tonic_types::transport::ClientTlsConfig::new().with_native_roots()
}

/// Set up OTLP export of request spans when `OTEL_EXPORTER_OTLP_ENDPOINT`
/// is set. Must run inside the Tokio runtime. Log output stays with the
/// `tracing` subscriber.
///
/// Reads config from environment:
///   - `OTEL_EXPORTER_OTLP_ENDPOINT`: collector gRPC address
///   - `OTEL_SERVICE_NAME`: service name tag (default: `auth-gateway`)
///   - `SIGNOZ_INGESTION_KEY`: collector access token (optional)
///   - `DEPLOY_ENV`: deployment environment tag (default: `development`)
pub fn init_telemetry() -> Result<(), TelemetryError> {
    let endpoint = match std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
        Ok(ep) if !ep.is_empty() => ep,
        _ => {
            tracing::info!("OTEL_EXPORTER_OTLP_ENDPOINT not set, skipping OTLP telemetry");
            return Ok(());
        }
    };

    let service_name =
        std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "auth-gateway".to_string());
    let environment = std::env::var("DEPLOY_ENV").unwrap_or_else(|_| "development".to_string());
    let metadata = ingestion_metadata()?;
    let secure = endpoint.starts_with("https://");

    let mut builder = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&endpoint);
    if secure {
        builder = builder.with_tls_config(tls_config());
    }
    if let Some(md) = metadata {
        builder = builder.with_metadata(md);
    }
    let exporter = builder.build()?;

    let resource = opentelemetry_sdk::Resource::builder()
        .with_service_name(service_name)
        .with_attribute(KeyValue::new("service.version", APP_VERSION))
        .with_attribute(KeyValue::new("deployment.environment", environment))
        .build();

    let provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build();
    global::set_tracer_provider(provider);

    tracing::info!(endpoint = %endpoint, version = APP_VERSION, "Telemetry initialized");
    Ok(())
}

/// Span name component for a path: numeric segments collapse to `{id}` so
/// spans group by route.
fn route_label(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit()) {
                "{id}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn user_attributes(user: Option<&GatewayUser>) -> Vec<KeyValue> {
    match user {
        Some(user) => {
            let mut attrs = vec![
                KeyValue::new("auth.status", "authenticated"),
                KeyValue::new("user.roles", user.roles.join(",")),
            ];
            if let Some(username) = &user.username {
                attrs.push(KeyValue::new("user.name", username.clone()));
            }
            if let Some(role) = user.internal_role {
                attrs.push(KeyValue::new("user.internal_role", role.as_str()));
            }
            attrs
        }
        None => vec![KeyValue::new("auth.status", "anonymous")],
    }
}

/// Tower layer that creates an OpenTelemetry span for each HTTP request.
///
/// Captures: method, path, user-agent, request ID, addressed service,
/// response status, and the verified user (if present). Must sit inside the
/// layer that attaches the user.
#[derive(Clone)]
pub struct OtelTraceLayer {
    config: Arc<GatewayConfig>,
}

impl OtelTraceLayer {
    pub fn new(config: Arc<GatewayConfig>) -> Self {
        Self { config }
    }
}

impl<S> Layer<S> for OtelTraceLayer {
    type Service = OtelTraceService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        OtelTraceService {
            inner,
            config: self.config.clone(),
        }
    }
}

#[derive(Clone)]
pub struct OtelTraceService<S> {
    inner: S,
    config: Arc<GatewayConfig>,
}

impl<S> Service<Request<Body>> for OtelTraceService<S>
where
    S: Service<Request<Body>, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let tracer = global::tracer("auth-gateway");
        let method = req.method().to_string();
        let path = req.uri().path().to_string();
        let header = |name: &str| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        let user_agent = header("user-agent").unwrap_or_else(|| "unknown".to_string());
        let request_id = header("x-request-id").unwrap_or_default();
        let referer = header("referer");
        let service = services::route_for(&self.config.services, &path, referer.as_deref())
            .map(|s| s.name.clone())
            .unwrap_or_else(|| "gateway".to_string());

        let mut attributes = vec![
            KeyValue::new("http.method", method.clone()),
            KeyValue::new("http.target", path.clone()),
            KeyValue::new("http.user_agent", user_agent),
            KeyValue::new("http.request_id", request_id),
            KeyValue::new("gateway.service", service),
        ];
        attributes.extend(user_attributes(req.extensions().get::<GatewayUser>()));

        let span = tracer
            .span_builder(format!("{} {}", &method, route_label(&path)))
            .with_kind(SpanKind::Server)
            .with_attributes(attributes)
            .start(&tracer);

        let cx = Context::current_with_span(span);
        let mut inner = self.inner.clone();

        let guard = cx.clone().attach();
        let future = inner.call(req);
        drop(guard);

        Box::pin(async move {
            let response = future.await?;

            let span = cx.span();
            let status = response.status();
            span.set_attribute(KeyValue::new("http.status_code", status.as_u16() as i64));

            if status.is_server_error() {
                span.set_status(opentelemetry::trace::Status::error(status.to_string()));
            } else if status.is_client_error() {
                span.set_attribute(KeyValue::new("error.type", "client_error"));
            }

            Ok(response)
        })
    }
}
