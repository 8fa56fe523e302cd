//! Test support: fakes for the ports, archive builders and a tiny HTTP server.

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use ulid::Ulid;

use crate::config;
use crate::domain::{CommandSpec, ErrorKind, PipelineError, PipelineSpec, RunId, RunPlan};
use crate::ports::{BackgroundProcess, CommandRunner, CommandStatus, Downloader};

pub(crate) fn run_id() -> RunId {
    RunId::from_ulid(Ulid::new())
}

/// Default configuration rooted at `workdir`.
pub(crate) fn spec_in(workdir: impl Into<PathBuf>) -> PipelineSpec {
    PipelineSpec {
        workdir: workdir.into(),
        ..PipelineSpec::default()
    }
}

/// Default plan for Python 3.4 rooted at `workdir`.
pub(crate) fn plan_in(workdir: impl Into<PathBuf>) -> RunPlan {
    config::plan_for(&spec_in(workdir), "3.4").unwrap()
}

pub(crate) fn fakes() -> (Arc<dyn CommandRunner>, Arc<dyn Downloader>) {
    (
        Arc::new(RecordingRunner::new()),
        Arc::new(FakeDownloader::new()),
    )
}

fn base_name(program: &str) -> String {
    Path::new(program)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.to_string())
}

// ---------------------------------------------------------------------------
// RecordingRunner
// ---------------------------------------------------------------------------

/// Records every command and answers with scripted exit codes.
///
/// Programs are matched by file name, so `/env/bin/pip` and `pip` are the same.
#[derive(Default)]
pub(crate) struct RecordingRunner {
    log: Mutex<Vec<CommandSpec>>,
    exit_codes: HashMap<String, i32>,
    socket: Option<PathBuf>,
    binds_once: bool,
    spawned: AtomicUsize,
    background_exit: Option<i32>,
    creates: HashMap<String, PathBuf>,
    terminate_fails: bool,
    terminated: Arc<AtomicUsize>,
}

impl RecordingRunner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// `program` exits with `code`.
    pub(crate) fn exit_code(mut self, program: &str, code: i32) -> Self {
        self.exit_codes.insert(program.to_string(), code);
        self
    }

    /// Spawned processes create `socket` as soon as they start. Stopping them
    /// leaves it behind, like a killed X server.
    pub(crate) fn with_socket(mut self, socket: impl Into<PathBuf>) -> Self {
        self.socket = Some(socket.into());
        self
    }

    /// Only the first spawned process creates the socket.
    pub(crate) fn binds_once(mut self) -> Self {
        self.binds_once = true;
        self
    }

    /// Stopping a spawned process reports an error.
    pub(crate) fn terminate_fails(mut self) -> Self {
        self.terminate_fails = true;
        self
    }

    /// Running `program` writes `file`.
    pub(crate) fn creates(mut self, program: &str, file: impl Into<PathBuf>) -> Self {
        self.creates.insert(program.to_string(), file.into());
        self
    }

    /// Spawned processes exit immediately with `code`.
    pub(crate) fn background_exits(mut self, code: i32) -> Self {
        self.background_exit = Some(code);
        self
    }

    /// Every command run or spawned, in order.
    pub(crate) fn calls(&self) -> Vec<CommandSpec> {
        self.log.lock().unwrap().clone()
    }

    /// File names of every program run or spawned, in order.
    pub(crate) fn programs(&self) -> Vec<String> {
        self.calls().iter().map(|c| base_name(&c.program)).collect()
    }

    pub(crate) fn count(&self, program: &str) -> usize {
        self.programs().iter().filter(|p| *p == program).count()
    }

    pub(crate) fn find(&self, program: &str) -> Option<CommandSpec> {
        self.calls()
            .into_iter()
            .find(|c| base_name(&c.program) == program)
    }

    pub(crate) fn terminated(&self) -> usize {
        self.terminated.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, cmd: &CommandSpec) -> Result<CommandStatus, PipelineError> {
        self.log.lock().unwrap().push(cmd.clone());
        if let Some(file) = self.creates.get(&base_name(&cmd.program)) {
            std::fs::write(file, b"!coverage").unwrap();
        }
        let code = self
            .exit_codes
            .get(&base_name(&cmd.program))
            .copied()
            .unwrap_or(0);
        Ok(CommandStatus::exited(code))
    }

    async fn spawn(&self, cmd: &CommandSpec) -> Result<Box<dyn BackgroundProcess>, PipelineError> {
        self.log.lock().unwrap().push(cmd.clone());
        let first = self.spawned.fetch_add(1, Ordering::SeqCst) == 0;
        if let Some(socket) = self.socket.as_ref().filter(|_| first || !self.binds_once) {
            if let Some(parent) = socket.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(socket, b"").unwrap();
        }
        Ok(Box::new(FakeProcess {
            exit: self.background_exit,
            fails: self.terminate_fails,
            terminated: self.terminated.clone(),
        }))
    }
}

struct FakeProcess {
    exit: Option<i32>,
    fails: bool,
    terminated: Arc<AtomicUsize>,
}

#[async_trait]
impl BackgroundProcess for FakeProcess {
    fn pid(&self) -> Option<u32> {
        self.exit.is_none().then_some(4242)
    }

    fn try_status(&mut self) -> Result<Option<CommandStatus>, PipelineError> {
        Ok(self.exit.map(CommandStatus::exited))
    }

    async fn terminate(self: Box<Self>) -> Result<(), PipelineError> {
        self.terminated.fetch_add(1, Ordering::SeqCst);
        if self.fails {
            return Err(PipelineError::io(
                ErrorKind::Display,
                "killing Xvfb",
                std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FakeDownloader
// ---------------------------------------------------------------------------

/// Serves prepared bodies by URL; anything else is a 404.
#[derive(Default)]
pub(crate) struct FakeDownloader {
    bodies: HashMap<String, Vec<u8>>,
    fallback: Option<Vec<u8>>,
    log: Mutex<Vec<String>>,
}

impl FakeDownloader {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(mut self, url: impl Into<String>, body: Vec<u8>) -> Self {
        self.bodies.insert(url.into(), body);
        self
    }

    /// Body for every URL without a prepared one.
    pub(crate) fn with_fallback(mut self, body: Vec<u8>) -> Self {
        self.fallback = Some(body);
        self
    }

    /// Serves archives for every dataset of `plan`, and a dummy installer.
    pub(crate) fn serving(plan: &RunPlan) -> Self {
        let mut this = Self::new().with_fallback(b"#!/bin/sh\nexit 0\n".to_vec());
        for ds in &plan.datasets {
            let body = match ds.name.as_str() {
                "movielens" => zip_bytes(&[
                    ("ml-100k/u.data", "196\t242\t3\t881250949"),
                    ("ml-100k/u.item", "1|Toy Story (1995)"),
                ]),
                _ => tar_gz_bytes(&[("face/face00001.pgm", "P5"), ("face/face00002.pgm", "P5")]),
            };
            this = this.with(ds.url.clone(), body);
        }
        this
    }

    pub(crate) fn urls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, PipelineError> {
        self.log.lock().unwrap().push(url.to_string());
        let body = self
            .bodies
            .get(url)
            .or(self.fallback.as_ref())
            .ok_or_else(|| PipelineError::Download {
                url: url.to_string(),
                reason: "status 404 Not Found".to_string(),
            })?;
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(dest, body).unwrap();
        Ok(body.len() as u64)
    }
}

// ---------------------------------------------------------------------------
// Archives
// ---------------------------------------------------------------------------

pub(crate) fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in entries {
        zip.start_file(*name, zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(contents.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

pub(crate) fn tar_gz_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (name, contents) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, contents.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

pub(crate) fn write_zip(path: &Path, entries: &[(&str, &str)]) {
    std::fs::write(path, zip_bytes(entries)).unwrap();
}

pub(crate) fn write_tar_gz(path: &Path, entries: &[(&str, &str)]) {
    std::fs::write(path, tar_gz_bytes(entries)).unwrap();
}

// ---------------------------------------------------------------------------
// StaticHttpServer
// ---------------------------------------------------------------------------

/// Serves fixed bodies over plain HTTP/1.1 on localhost. Stops on drop.
pub(crate) struct StaticHttpServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl StaticHttpServer {
    pub(crate) async fn start(routes: Vec<(&'static str, Vec<u8>)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes: Arc<HashMap<String, Vec<u8>>> = Arc::new(
            routes
                .into_iter()
                .map(|(path, body)| (path.to_string(), body))
                .collect(),
        );

        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let routes = routes.clone();
                tokio::spawn(async move {
                    let _ = serve(stream, &routes).await;
                });
            }
        });
        Self { addr, handle }
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for StaticHttpServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(mut stream: TcpStream, routes: &HashMap<String, Vec<u8>>) -> std::io::Result<()> {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") && request.len() < 16 * 1024 {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        request.extend_from_slice(&buf[..n]);
    }

    let head = String::from_utf8_lossy(&request);
    let path = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .map(|target| target.split('?').next().unwrap_or(target))
        .unwrap_or("/");

    match routes.get(path) {
        Some(body) => {
            let header = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            stream.write_all(header.as_bytes()).await?;
            stream.write_all(body).await?;
        }
        None => {
            stream
                .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await?;
        }
    }
    stream.shutdown().await
}
