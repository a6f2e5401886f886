#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Clone)]
pub struct TestHttpResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl TestHttpResponse {
    pub fn ok_js(body: &str) -> Self {
        Self {
            status: 200,
            headers: vec![(
                "Content-Type".to_string(),
                "application/javascript".to_string(),
            )],
            body: body.as_bytes().to_vec(),
        }
    }

    pub fn ok_json(body: &str) -> Self {
        Self {
            status: 200,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: body.as_bytes().to_vec(),
        }
    }

    pub fn redirect(location: &str) -> Self {
        Self {
            status: 302,
            headers: vec![("Location".to_string(), location.to_string())],
            body: Vec::new(),
        }
    }
}

/// Minimal HTTP/1.1 server standing in for a package CDN.
pub struct TestHttpServer {
    addr: SocketAddr,
    running: Arc<AtomicBool>,
    hits: Arc<Mutex<HashMap<String, usize>>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl TestHttpServer {
    pub fn new(routes: Vec<(&str, TestHttpResponse)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().unwrap();
        let routes = Arc::new(
            routes
                .into_iter()
                .map(|(path, response)| (path.to_string(), response))
                .collect::<HashMap<_, _>>(),
        );
        let running = Arc::new(AtomicBool::new(true));
        let hits = Arc::new(Mutex::new(HashMap::new()));
        let running_clone = running.clone();
        let hits_clone = hits.clone();
        let handle = thread::spawn(move || {
            while running_clone.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok((stream, _)) => {
                        let _ = stream.set_nonblocking(false);
                        handle_test_http_connection(stream, &routes, &hits_clone);
                    }
                    Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(Duration::from_millis(5));
                    }
                    Err(_) => break,
                }
            }
        });
        Self {
            addr,
            running,
            hits,
            handle: Some(handle),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

impl Drop for TestHttpServer {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = TcpStream::connect(self.addr);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn handle_test_http_connection(
    mut stream: TcpStream,
    routes: &HashMap<String, TestHttpResponse>,
    hits: &Mutex<HashMap<String, usize>>,
) {
    let Ok(reader_stream) = stream.try_clone() else {
        return;
    };
    let mut reader = BufReader::new(reader_stream);

    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }
    let request_target = request_line.split_whitespace().nth(1).unwrap_or("/");
    let request_path = request_target.split('?').next().unwrap_or(request_target);

    loop {
        let mut header_line = String::new();
        if reader.read_line(&mut header_line).is_err() {
            return;
        }
        if header_line == "\r\n" || header_line == "\n" || header_line.is_empty() {
            break;
        }
    }

    *hits
        .lock()
        .unwrap()
        .entry(request_path.to_string())
        .or_default() += 1;

    let response = routes
        .get(request_path)
        .cloned()
        .unwrap_or_else(|| TestHttpResponse {
            status: 404,
            headers: vec![("Content-Type".to_string(), "text/plain".to_string())],
            body: b"not found".to_vec(),
        });

    let mut headers = response.headers;
    headers.push(("Content-Length".to_string(), response.body.len().to_string()));
    headers.push(("Connection".to_string(), "close".to_string()));

    let mut response_head = format!(
        "HTTP/1.1 {} {}\r\n",
        response.status,
        http_reason_phrase(response.status)
    );
    for (name, value) in headers {
        response_head.push_str(&format!("{name}: {value}\r\n"));
    }
    response_head.push_str("\r\n");

    let _ = stream.write_all(response_head.as_bytes());
    let _ = stream.write_all(&response.body);
    let _ = stream.flush();
}

fn http_reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        302 => "Found",
        404 => "Not Found",
        _ => "Status",
    }
}
