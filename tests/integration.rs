use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use rax_ftpd::auth::{UserCredential, provision};
use rax_ftpd::config::{ServerConfig, Settings};
use rax_ftpd::server::{self, StopHandle, TransferServiceSupervisor};
use rax_ftpd::tls::acceptor::read_certificates;
use rax_ftpd::tls::{TlsMaterial, ensure_certificate};

const TIMEOUT: Duration = Duration::from_secs(10);

// Helper that speaks the control protocol over any stream
struct FtpClient<S> {
    stream: BufReader<S>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> FtpClient<S> {
    fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
        }
    }

    // Read one reply, following multi-line replies to their final line
    async fn reply(&mut self) -> String {
        let mut all = String::new();
        loop {
            let mut line = String::new();
            let n = tokio::time::timeout(TIMEOUT, self.stream.read_line(&mut line))
                .await
                .expect("reply timed out")
                .unwrap();
            assert!(n > 0, "connection closed after {:?}", all);
            all.push_str(&line);

            let bytes = line.as_bytes();
            if bytes.len() >= 4 && bytes[..3].iter().all(u8::is_ascii_digit) && bytes[3] == b' ' {
                return all;
            }
        }
    }

    async fn send(&mut self, command: &str) -> String {
        let stream = self.stream.get_mut();
        stream
            .write_all(format!("{}\r\n", command).as_bytes())
            .await
            .unwrap();
        stream.flush().await.unwrap();
        self.reply().await
    }

    async fn login(&mut self, user: &str, password: &str) {
        assert!(self.send(&format!("USER {}", user)).await.starts_with("331"));
        let reply = self.send(&format!("PASS {}", password)).await;
        assert!(reply.starts_with("230"), "login failed: {}", reply);
    }

    fn into_inner(self) -> S {
        self.stream.into_inner()
    }
}

// Extract the data port from a 227 reply
fn passive_port(reply: &str) -> u16 {
    assert!(reply.starts_with("227"), "unexpected PASV reply: {}", reply);
    let start = reply.find('(').unwrap() + 1;
    let end = reply.find(')').unwrap();
    let fields: Vec<u16> = reply[start..end]
        .split(',')
        .map(|n| n.trim().parse().unwrap())
        .collect();
    fields[4] * 256 + fields[5]
}

struct TestServer {
    dir: TempDir,
    addr: SocketAddr,
    stop: StopHandle,
    task: JoinHandle<()>,
    cert: Option<PathBuf>,
}

impl TestServer {
    fn base(&self) -> PathBuf {
        self.dir.path().join("ftp")
    }

    async fn connect(&self) -> FtpClient<TcpStream> {
        let mut client = FtpClient::new(TcpStream::connect(self.addr).await.unwrap());
        assert!(client.reply().await.starts_with("220"));
        client
    }

    async fn stop(self) {
        self.stop.stop();
        tokio::time::timeout(TIMEOUT, self.task)
            .await
            .expect("supervisor did not stop")
            .unwrap();
    }
}

async fn start_server(anonymous: bool, tls: bool, per_ip: usize) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings {
        passive_port_start: 51000,
        passive_port_end: 51999,
        max_connections_per_ip: per_ip,
        ..Settings::default()
    };
    let config = ServerConfig::new(
        0,
        anonymous,
        vec![UserCredential::new("alice", "secret")],
        dir.path().join("ftp"),
        tls,
        &settings,
    );
    let table = provision(&config).unwrap();

    let cert = tls.then(|| ensure_certificate(&dir.path().join("server.pem")).unwrap());
    let material = cert.clone().map(TlsMaterial::combined);

    let supervisor = TransferServiceSupervisor::bind(
        &config,
        table,
        material.as_ref(),
        "127.0.0.1".parse().unwrap(),
    )
    .await
    .unwrap();
    let addr = supervisor.local_addr();
    let stop = supervisor.stop_handle();
    let task = tokio::spawn(supervisor.run());

    TestServer {
        dir,
        addr,
        stop,
        task,
        cert,
    }
}

fn tls_connector(cert: &Path) -> tokio_rustls::TlsConnector {
    let mut roots = rustls::RootCertStore::empty();
    for der in read_certificates(cert).unwrap() {
        roots.add(der).unwrap();
    }
    let config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .unwrap()
    .with_root_certificates(roots)
    .with_no_client_auth();
    tokio_rustls::TlsConnector::from(Arc::new(config))
}

fn localhost() -> rustls::pki_types::ServerName<'static> {
    rustls::pki_types::ServerName::try_from("localhost").unwrap()
}

#[tokio::test]
async fn test_user_login() {
    let server = start_server(false, false, 10).await;
    let mut client = server.connect().await;

    assert!(client.send("USER alice").await.starts_with("331"));
    assert!(client.send("PASS wrong").await.starts_with("530"));

    client.login("alice", "secret").await;
    assert_eq!(client.send("PWD").await, "257 \"/\" is the current directory\r\n");
    assert!(client.send("SYST").await.starts_with("215"));
    assert!(client.send("QUIT").await.starts_with("221"));

    server.stop().await;
}

#[tokio::test]
async fn test_commands_require_login() {
    let server = start_server(false, false, 10).await;
    let mut client = server.connect().await;

    assert!(client.send("LIST").await.starts_with("530"));
    assert!(client.send("RETR secret.txt").await.starts_with("530"));
    assert!(client.send("AUTH TLS").await.starts_with("502"));
    assert!(client.send("SITE CHMOD 777 x").await.starts_with("502"));

    server.stop().await;
}

#[tokio::test]
async fn test_overlong_command_closes_connection() {
    let server = start_server(false, false, 10).await;
    let mut client = server.connect().await;
    assert!(client.send("NOOP").await.starts_with("200"));

    let stream = client.stream.get_mut();
    stream.write_all(&[b'A'; 512]).await.unwrap();
    stream.flush().await.unwrap();
    assert!(client.reply().await.starts_with("500"));

    let mut rest = String::new();
    let n = tokio::time::timeout(TIMEOUT, client.stream.read_line(&mut rest))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0);

    server.stop().await;
}

#[tokio::test]
async fn test_passive_store_list_retrieve() {
    let server = start_server(false, false, 10).await;
    let mut client = server.connect().await;
    client.login("alice", "secret").await;
    assert!(client.send("TYPE I").await.starts_with("200"));

    // STOR
    let port = passive_port(&client.send("PASV").await);
    let mut data = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    assert!(client.send("STOR hello.txt").await.starts_with("150"));
    data.write_all(b"hello over ftp\n").await.unwrap();
    data.shutdown().await.unwrap();
    drop(data);
    assert!(client.reply().await.starts_with("226"));
    assert_eq!(
        std::fs::read_to_string(server.base().join("alice/hello.txt")).unwrap(),
        "hello over ftp\n"
    );

    // LIST
    let port = passive_port(&client.send("PASV").await);
    let mut data = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    assert!(client.send("LIST").await.starts_with("150"));
    let mut listing = String::new();
    data.read_to_string(&mut listing).await.unwrap();
    assert!(listing.contains("hello.txt"));
    assert!(client.reply().await.starts_with("226"));

    // RETR
    let port = passive_port(&client.send("PASV").await);
    let mut data = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    assert!(client.send("RETR hello.txt").await.starts_with("150"));
    let mut content = String::new();
    data.read_to_string(&mut content).await.unwrap();
    assert_eq!(content, "hello over ftp\n");
    assert!(client.reply().await.starts_with("226"));

    // Navigation and housekeeping
    assert!(client.send("MKD reports").await.starts_with("257"));
    assert!(client.send("CWD reports").await.starts_with("250"));
    assert_eq!(client.send("PWD").await, "257 \"/reports\" is the current directory\r\n");
    assert!(client.send("CDUP").await.starts_with("250"));
    assert!(client.send("CWD ../../..").await.starts_with("250"));
    assert_eq!(client.send("PWD").await, "257 \"/\" is the current directory\r\n");
    assert!(client.send("RNFR hello.txt").await.starts_with("350"));
    assert!(client.send("RNTO reports/hello.txt").await.starts_with("250"));
    assert!(server.base().join("alice/reports/hello.txt").is_file());
    assert!(client.send("DELE reports/hello.txt").await.starts_with("250"));
    assert!(client.send("RMD reports").await.starts_with("250"));

    server.stop().await;
}

#[tokio::test]
async fn test_retr_without_pasv_is_refused() {
    let server = start_server(false, false, 10).await;
    std::fs::write(server.base().join("alice/a.txt"), b"a").unwrap();
    let mut client = server.connect().await;
    client.login("alice", "secret").await;

    assert!(client.send("RETR a.txt").await.starts_with("425"));
    assert!(client.send("RETR missing.txt").await.starts_with("550"));

    server.stop().await;
}

#[tokio::test]
async fn test_refused_upload_keeps_existing_file() {
    let server = start_server(false, false, 10).await;
    let target = server.base().join("alice/important.txt");
    std::fs::write(&target, b"precious data").unwrap();
    let mut client = server.connect().await;
    client.login("alice", "secret").await;

    assert!(client.send("STOR important.txt").await.starts_with("425"));
    assert!(client.send("APPE fresh.txt").await.starts_with("425"));

    assert_eq!(std::fs::read(&target).unwrap(), b"precious data");
    assert!(!server.base().join("alice/fresh.txt").exists());

    server.stop().await;
}

#[tokio::test]
async fn test_anonymous_is_read_only() {
    let server = start_server(true, false, 10).await;
    std::fs::write(server.base().join("anonymous/readme.txt"), b"public").unwrap();
    let mut client = server.connect().await;
    client.login("anonymous", "guest@example.com").await;

    assert!(client.send("STOR upload.txt").await.starts_with("550"));
    assert!(client.send("MKD newdir").await.starts_with("550"));
    assert!(client.send("DELE readme.txt").await.starts_with("550"));
    assert!(!server.base().join("anonymous/upload.txt").exists());

    let port = passive_port(&client.send("PASV").await);
    let mut data = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    assert!(client.send("RETR readme.txt").await.starts_with("150"));
    let mut content = String::new();
    data.read_to_string(&mut content).await.unwrap();
    assert_eq!(content, "public");
    assert!(client.reply().await.starts_with("226"));

    server.stop().await;
}

#[tokio::test]
async fn test_anonymous_refused_when_disabled() {
    let server = start_server(false, false, 10).await;
    let mut client = server.connect().await;

    assert!(client.send("USER anonymous").await.starts_with("331"));
    assert!(client.send("PASS guest@example.com").await.starts_with("530"));

    server.stop().await;
}

#[tokio::test]
async fn test_per_ip_connection_cap() {
    let server = start_server(false, false, 1).await;
    let _first = server.connect().await;

    let mut second = FtpClient::new(TcpStream::connect(server.addr).await.unwrap());
    assert!(second.reply().await.starts_with("421"));

    server.stop().await;
}

#[tokio::test]
async fn test_tls_required() {
    let server = start_server(false, true, 10).await;
    let mut client = server.connect().await;

    // Only negotiation commands before AUTH TLS
    assert!(client.send("USER alice").await.starts_with("530"));
    let features = client.send("FEAT").await;
    assert!(features.starts_with("211-"));
    assert!(features.contains("AUTH TLS"));
    assert!(client.send("AUTH TLS").await.starts_with("234"));

    let connector = tls_connector(server.cert.as_ref().unwrap());
    let tls = connector
        .connect(localhost(), client.into_inner())
        .await
        .unwrap();
    let mut client = FtpClient::new(tls);

    client.login("alice", "secret").await;
    assert!(client.send("PASV").await.starts_with("522"));
    assert!(client.send("PBSZ 0").await.starts_with("200"));
    assert!(client.send("PROT C").await.starts_with("534"));
    assert!(client.send("PROT P").await.starts_with("200"));

    std::fs::write(server.base().join("alice/secure.txt"), b"top secret").unwrap();
    let port = passive_port(&client.send("PASV").await);
    let data = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    assert!(client.send("RETR secure.txt").await.starts_with("150"));
    let mut data = connector.connect(localhost(), data).await.unwrap();
    let mut content = String::new();
    data.read_to_string(&mut content).await.unwrap();
    assert_eq!(content, "top secret");
    assert!(client.reply().await.starts_with("226"));

    server.stop().await;
}

#[tokio::test]
async fn test_stop_is_idempotent_and_notifies_sessions() {
    let server = start_server(false, false, 10).await;
    let mut client = server.connect().await;
    client.login("alice", "secret").await;

    server.stop.stop();
    server.stop.stop();
    assert!(client.reply().await.starts_with("421"));

    let addr = server.addr;
    server.stop().await;
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_lifecycle_serves_admin_page() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("ftp.log");
    std::fs::write(
        &log_path,
        "2026-01-01 10:00:00 - INFO - accidental s3cret-pw in the log\n",
    )
    .unwrap();

    let settings = Settings {
        bind_address: "127.0.0.1".to_string(),
        monitor_port: 0,
        passive_port_start: 51000,
        passive_port_end: 51999,
        log_file: log_path.display().to_string(),
        cert_file: dir.path().join("server.pem").display().to_string(),
        ..Settings::default()
    };
    let config = ServerConfig::new(
        0,
        true,
        vec![UserCredential::new("alice", "s3cret-pw")],
        dir.path().join("ftp"),
        false,
        &settings,
    );

    let service = server::start(config, &settings).await.unwrap();
    assert!(dir.path().join("ftp/alice").is_dir());
    assert!(dir.path().join("ftp/anonymous").is_dir());

    let mut http = TcpStream::connect(service.monitor_addr()).await.unwrap();
    http.write_all(b"GET /admin HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    tokio::time::timeout(TIMEOUT, http.read_to_string(&mut response))
        .await
        .unwrap()
        .unwrap();

    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains("<li>alice</li>"));
    assert!(response.contains("51000-51999"));
    assert!(response.contains("accidental ********"));
    assert!(!response.contains("s3cret-pw"));

    tokio::time::timeout(TIMEOUT, service.shutdown()).await.unwrap();
}
