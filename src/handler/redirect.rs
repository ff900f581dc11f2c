//! RedirectHandler (§4.9): always `DONE`, grounded on the teacher's
//! `HttpResponse::redirect` (`src/http/response.rs`).

use crate::handler::{Handler, HandlerContext, Outcome};

pub struct RedirectHandler {
    pub status: u16,
    pub target: String,
}

impl Handler for RedirectHandler {
    fn start(&mut self, ctx: &mut HandlerContext) -> Outcome {
        ctx.response.set_status(self.status);
        ctx.response.set_header("Location", &self.target);
        ctx.response.set_header("Content-Length", "0");
        ctx.response.set_header("Connection", "close");
        Outcome::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::message::{Request, Response};
    use crate::router::{resolve, ResolvedLocation};
    use crate::uri::Uri;

    fn ctx_fixture<'a>(
        request: &'a Request,
        location: &'a ResolvedLocation,
        server: &'a ServerConfig,
        response: &'a mut Response,
        write_buffer: &'a mut Vec<u8>,
    ) -> HandlerContext<'a> {
        HandlerContext {
            request,
            location,
            server,
            resolved_path: None,
            peer_addr: "127.0.0.1:0".parse().unwrap(),
            response,
            write_buffer,
        }
    }

    #[test]
    fn redirect_sets_status_and_location() {
        let server = ServerConfig::default();
        let location = resolve(None, &server, "/");
        let request = Request {
            method: "GET".into(),
            uri: Uri::parse("/old").unwrap(),
            raw_target: "/old".into(),
            version: "HTTP/1.1".into(),
            headers: Default::default(),
            cookies: Default::default(),
            body: Vec::new(),
        };
        let mut response = Response::new(200);
        let mut write_buffer = Vec::new();
        let mut ctx = ctx_fixture(&request, &location, &server, &mut response, &mut write_buffer);

        let mut handler = RedirectHandler { status: 301, target: "/new".into() };
        assert_eq!(handler.start(&mut ctx), Outcome::Done);
        assert_eq!(ctx.response.status_code, 301);
        assert_eq!(ctx.response.headers.get("location"), Some("/new"));
    }
}
