//! HTTP server adapter (ESP-IDF only).
//!
//! Thin routing shim: registers the service endpoints on the ESP-IDF
//! HTTP server and forwards every request to the command dispatcher,
//! which owns the whole request/response contract. Host tests exercise
//! the dispatcher directly, so nothing here carries logic.

#[cfg(target_os = "espidf")]
pub mod esp {
    use std::sync::Arc;

    use esp_idf_svc::http::Method as HttpMethod;
    use esp_idf_svc::http::server::{Configuration, EspHttpServer};
    use esp_idf_svc::io::{Read, Write};
    use log::info;

    use crate::Error;
    use crate::app::dispatch::{Dispatcher, Method};
    use crate::app::ports::StoragePort;

    /// Body size cap; config documents stay far below this.
    const MAX_BODY: usize = 4096;

    const ROUTES: &[(&str, Method)] = &[
        ("/service/config/network", Method::Get),
        ("/service/config/network", Method::Post),
        ("/service/config/feed", Method::Get),
        ("/service/config/feed", Method::Post),
        ("/service/config/factoryReset", Method::Post),
        ("/service/reboot", Method::Post),
        ("/service/upgrade", Method::Post),
        ("/ui/deviceInfo", Method::Get),
        ("/ui/feed", Method::Post),
    ];

    pub fn start_server<S>(dispatcher: Arc<Dispatcher<S>>) -> Result<EspHttpServer<'static>, Error>
    where
        S: StoragePort + Send + 'static,
    {
        let mut server = EspHttpServer::new(&Configuration::default())
            .map_err(|_| Error::Init("http server"))?;

        for &(path, method) in ROUTES {
            let dispatcher = dispatcher.clone();
            let http_method = match method {
                Method::Get => HttpMethod::Get,
                Method::Post => HttpMethod::Post,
            };
            server
                .fn_handler(path, http_method, move |mut request| -> anyhow::Result<()> {
                    let uri = request.uri().to_string();
                    let query = uri.split_once('?').map(|(_, q)| q.to_string());

                    let body = if method == Method::Post {
                        let mut buf = vec![0u8; MAX_BODY];
                        let n = request.read(&mut buf)?;
                        buf.truncate(n);
                        Some(String::from_utf8_lossy(&buf).into_owned())
                    } else {
                        None
                    };

                    let verdict =
                        dispatcher.route(method, path, query.as_deref(), body.as_deref());
                    let mut response = request.into_response(
                        verdict.status,
                        None,
                        &[("Content-Type", "application/json")],
                    )?;
                    response.write_all(verdict.body.as_bytes())?;
                    Ok(())
                })
                .map_err(|_| Error::Init("http route"))?;
        }

        info!("http: {} routes registered", ROUTES.len());
        Ok(server)
    }
}
