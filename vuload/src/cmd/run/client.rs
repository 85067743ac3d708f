use rama::{
    Layer as _, Service as _,
    error::{BoxError, ErrorContext as _},
    http::{Request, Response, client::EasyHttpWebClient},
    layer::MapErrLayer,
    rt::Executor,
    service::BoxService,
};

/// Cloneable HTTP(S) client handle shared by all virtual users.
pub type HttpClient = BoxService<Request, Response, BoxError>;

/// Create the web client used to issue the load traffic.
///
/// Connections are pooled, driven by `exec`, and HTTPS is handled using boringssl.
/// No retries are applied: every request is issued exactly once.
pub fn new_web_client(exec: Executor) -> Result<HttpClient, BoxError> {
    let client = EasyHttpWebClient::connector_builder()
        .with_default_transport_connector()
        .without_tls_proxy_support()
        .without_proxy_support()
        .with_tls_support_using_boringssl(None)
        .with_default_http_connector(exec)
        .try_with_default_connection_pool()
        .context("create connection pool for load web client")?
        .build_client();

    Ok(MapErrLayer::new(into_box_error).into_layer(client).boxed())
}

fn into_box_error<E: Into<BoxError>>(err: E) -> BoxError {
    err.into()
}
