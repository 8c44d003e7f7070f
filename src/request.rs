use crate::router::RouteParams;
use bytes::Bytes;
use cookie::Cookie;
use http_body_util::Full;
use hyper::header::{self, HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue};
use hyper::{Method, Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use url::Url;

/// One request as handlers and hooks see it, plus the response state they
/// build up.
pub struct RequestEvent {
    pub method: Method,
    /// Absolute, based on the `Origin` header, else `Host`, else localhost.
    pub url: Url,
    pub headers: HeaderMap,
    pub params: RouteParams,
    /// Free-form values hooks pass down to handlers.
    pub locals: HashMap<String, Value>,
    pub status: StatusCode,
    body: Bytes,
    /// Set by the server loop as a request extension.
    peer: Option<SocketAddr>,
    request_cookies: HashMap<String, String>,
    response_cookies: Vec<Cookie<'static>>,
    response_headers: HeaderMap,
}

impl RequestEvent {
    pub fn new(request: Request<Bytes>) -> Self {
        let (parts, body) = request.into_parts();
        let mut url = base_url(&parts.headers);
        url.set_path(parts.uri.path());
        url.set_query(parts.uri.query());
        Self {
            method: parts.method,
            url,
            request_cookies: parse_cookies(&parts.headers),
            headers: parts.headers,
            params: RouteParams::new(),
            locals: HashMap::new(),
            status: StatusCode::OK,
            body,
            peer: parts.extensions.get::<SocketAddr>().copied(),
            response_cookies: Vec::new(),
            response_headers: HeaderMap::new(),
        }
    }

    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Value of a cookie the client sent.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.request_cookies.get(name).map(String::as_str)
    }

    /// Queues a `set-cookie` header, replacing one queued under the same name.
    pub fn set_cookie(&mut self, cookie: impl Into<Cookie<'static>>) {
        let cookie = cookie.into();
        self.response_cookies
            .retain(|queued| queued.name() != cookie.name());
        self.response_cookies.push(cookie);
    }

    /// Tells the client to drop `name` on `path`.
    pub fn delete_cookie(&mut self, name: &str, path: &str) {
        let mut removal = Cookie::build((name.to_string(), ""))
            .path(path.to_string())
            .build();
        removal.make_removal();
        self.set_cookie(removal);
    }

    pub fn response_cookies(&self) -> &[Cookie<'static>] {
        &self.response_cookies
    }

    /// First `x-forwarded-for` hop, else the connection's peer address.
    pub fn client_address(&self) -> Option<String> {
        self.header("x-forwarded-for")
            .and_then(|forwarded| forwarded.split(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty())
            .map(str::to_string)
            .or_else(|| self.peer.map(|peer| peer.ip().to_string()))
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn text(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.body)
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }

    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.response_headers.insert(name, value);
    }

    pub fn response_headers(&self) -> &HeaderMap {
        &self.response_headers
    }

    pub(crate) fn take_response_header(&mut self, name: HeaderName) -> Option<HeaderValue> {
        self.response_headers.remove(name)
    }

    /// Sets the status (302 unless given) and the `location` header.
    pub fn redirect(
        &mut self,
        location: &str,
        status: Option<StatusCode>,
    ) -> Result<(), InvalidHeaderValue> {
        let location = HeaderValue::from_str(location)?;
        self.status = status.unwrap_or(StatusCode::FOUND);
        self.set_header(header::LOCATION, location);
        Ok(())
    }

    /// Builds a response from the status and headers set so far, leaving
    /// the event with none. Lets a hook answer on its own.
    pub fn respond(&mut self, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(body.into()));
        *response.status_mut() = self.status;
        *response.headers_mut() = std::mem::take(&mut self.response_headers);
        for cookie in self.response_cookies.drain(..) {
            match HeaderValue::from_str(&cookie.to_string()) {
                Ok(value) => {
                    response.headers_mut().append(header::SET_COOKIE, value);
                }
                Err(e) => tracing::warn!(cookie = %cookie.name(), "dropping unencodable cookie: {e}"),
            }
        }
        response
    }

    pub(crate) fn into_response(mut self, body: Bytes) -> Response<Full<Bytes>> {
        self.respond(body)
    }
}

/// The first occurrence of a name wins.
fn parse_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    for value in headers.get_all(header::COOKIE) {
        let Ok(value) = value.to_str() else {
            continue;
        };
        for cookie in Cookie::split_parse(value).flatten() {
            cookies
                .entry(cookie.name().to_string())
                .or_insert_with(|| cookie.value().to_string());
        }
    }
    cookies
}

fn base_url(headers: &HeaderMap) -> Url {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
        .and_then(|origin| Url::parse(origin).ok());
    let host = || {
        headers
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .and_then(|host| Url::parse(&format!("http://{host}")).ok())
    };
    origin
        .or_else(host)
        .unwrap_or_else(|| Url::parse("http://localhost/").expect("valid fallback url"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str, headers: &[(&str, &str)]) -> Request<Bytes> {
        let mut builder = Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Bytes::from_static(b"{\"n\":3}")).unwrap()
    }

    #[test]
    fn url_base_prefers_origin_then_host() {
        let event = RequestEvent::new(request(
            "/a?b=c",
            &[("origin", "https://example.com"), ("host", "other:8080")],
        ));
        assert_eq!(event.url.as_str(), "https://example.com/a?b=c");

        let event = RequestEvent::new(request("/a", &[("host", "other:8080")]));
        assert_eq!(event.url.as_str(), "http://other:8080/a");

        let event = RequestEvent::new(request("/a", &[]));
        assert_eq!(event.url.as_str(), "http://localhost/a");
    }

    #[test]
    fn scheme_relative_paths_stay_on_the_request_host() {
        let event = RequestEvent::new(request("//evil.example/x", &[("host", "site")]));
        assert_eq!(event.url.host_str(), Some("site"));
    }

    #[test]
    fn body_is_readable_as_text_and_json() {
        #[derive(serde::Deserialize)]
        struct Body {
            n: u32,
        }
        let event = RequestEvent::new(request("/", &[]));
        assert_eq!(event.text().unwrap(), r#"{"n":3}"#);
        assert_eq!(event.json::<Body>().unwrap().n, 3);
    }

    #[test]
    fn request_cookies_are_parsed_first_one_winning() {
        let event = RequestEvent::new(request(
            "/",
            &[("cookie", "session=abc; theme=dark"), ("cookie", "session=late")],
        ));
        assert_eq!(event.cookie("session"), Some("abc"));
        assert_eq!(event.cookie("theme"), Some("dark"));
        assert_eq!(event.cookie("missing"), None);
    }

    #[test]
    fn queued_cookies_become_set_cookie_headers() {
        let mut event = RequestEvent::new(request("/", &[]));
        event.set_cookie(Cookie::build(("session", "old")).path("/"));
        event.set_cookie(Cookie::build(("session", "new")).path("/").http_only(true));
        event.delete_cookie("theme", "/");
        let response = event.into_response(Bytes::new());

        let cookies: Vec<&str> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|value| value.to_str().unwrap())
            .collect();
        assert_eq!(cookies.len(), 2);
        assert!(cookies[0].starts_with("session=new"));
        assert!(cookies[0].contains("HttpOnly"));
        assert!(cookies[1].starts_with("theme=;"));
        assert!(cookies[1].contains("Max-Age=0"));
        assert!(cookies[1].contains("Path=/"));
    }

    #[test]
    fn client_address_prefers_the_first_forwarded_hop() {
        let peer: SocketAddr = "10.0.0.7:51000".parse().unwrap();
        let with_peer = |headers: &[(&str, &str)]| {
            let mut request = request("/", headers);
            request.extensions_mut().insert(peer);
            RequestEvent::new(request)
        };
        assert_eq!(
            with_peer(&[("x-forwarded-for", "203.0.113.9, 10.0.0.1")]).client_address(),
            Some("203.0.113.9".to_string())
        );
        assert_eq!(with_peer(&[]).client_address(), Some("10.0.0.7".to_string()));
        assert_eq!(RequestEvent::new(request("/", &[])).client_address(), None);
    }

    #[test]
    fn redirect_defaults_to_found() {
        let mut event = RequestEvent::new(request("/", &[]));
        event.redirect("/login", None).unwrap();
        let response = event.into_response(Bytes::new());
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/login");

        let mut event = RequestEvent::new(request("/", &[]));
        event
            .redirect("/moved", Some(StatusCode::MOVED_PERMANENTLY))
            .unwrap();
        assert_eq!(event.status, StatusCode::MOVED_PERMANENTLY);
        assert!(event.redirect("bad\nvalue", None).is_err());
    }
}
