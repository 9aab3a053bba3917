use bincode::Options;
use std::collections::HashMap;
use std::io::{BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::key::Key;
use crate::{MESSAGE_LENGTH, SUCCESSOR_LIST_SIZE};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Request {
    pub sender: String,
    pub payload: RequestPayload,
}

/// One variant per remotely invokable method. Every method takes exactly one argument.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum RequestPayload {
    FindSuccessor(Key),
    GetPredecessor,
    GetSuccessorList,
    TransferData(String),
    SubBackup(HashMap<String, String>),
    AddBackup(HashMap<String, String>),
    SetBackup,
    ChangePredecessor,
    Notify(String),
    Stabilize,
    InsertPairInData(KeyValue),
    InsertPairInBackup(KeyValue),
    GetValue(String),
    ErasePairInData(String),
    ErasePairInBackup(String),
}

impl RequestPayload {
    pub fn method_name(&self) -> &'static str {
        match self {
            RequestPayload::FindSuccessor(_) => "FindSuccessor",
            RequestPayload::GetPredecessor => "GetPredecessor",
            RequestPayload::GetSuccessorList => "GetSuccessorList",
            RequestPayload::TransferData(_) => "TransferData",
            RequestPayload::SubBackup(_) => "SubBackup",
            RequestPayload::AddBackup(_) => "AddBackup",
            RequestPayload::SetBackup => "SetBackup",
            RequestPayload::ChangePredecessor => "ChangePredecessor",
            RequestPayload::Notify(_) => "Notify",
            RequestPayload::Stabilize => "Stabilize",
            RequestPayload::InsertPairInData(_) => "InsertPairInData",
            RequestPayload::InsertPairInBackup(_) => "InsertPairInBackup",
            RequestPayload::GetValue(_) => "GetValue",
            RequestPayload::ErasePairInData(_) => "ErasePairInData",
            RequestPayload::ErasePairInBackup(_) => "ErasePairInBackup",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Response {
    pub receiver: String,
    pub payload: ResponsePayload,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ResponsePayload {
    Done,
    Address(String),
    SuccessorList([String; SUCCESSOR_LIST_SIZE]),
    Data(HashMap<String, String>),
    Value(String),
    Error(String),
}

/// Answers requests arriving at a `Protocol` server.
pub trait RpcHandler: Clone + Send + 'static {
    fn handle(&self, request: Request) -> ResponsePayload;
}

fn codec() -> impl Options {
    bincode::DefaultOptions::new().with_limit(MESSAGE_LENGTH)
}

fn write_message<T: serde::Serialize>(stream: &mut TcpStream, message: &T) -> Result<()> {
    let buffer = codec().serialize(message)?;
    stream.write_all(&buffer)?;
    stream.flush()?;
    Ok(())
}

fn read_message<T: serde::de::DeserializeOwned>(stream: &TcpStream) -> Result<T> {
    Ok(codec().deserialize_from(BufReader::new(stream))?)
}

fn resolve(addr: &str) -> Result<SocketAddr> {
    if addr.is_empty() {
        return Err(Error::MalformedAddress);
    }
    addr.to_socket_addrs()?
        .next()
        .ok_or_else(|| Error::UnreachablePeer(addr.to_string()))
}

/// The RPC server of a node: one accept thread and one thread per inbound connection.
pub struct Protocol {
    addr: String,
    local_addr: SocketAddr,
    is_active: Arc<AtomicBool>,
    accept_thread: Option<JoinHandle<()>>,
    config: Arc<Config>,
}

impl Protocol {
    /// Binds to `addr` and starts serving requests with `handler`.
    pub fn bind<H: RpcHandler>(addr: &str, handler: H, config: Arc<Config>) -> Result<Protocol> {
        let listener = TcpListener::bind(resolve(addr)?)?;
        let local_addr = listener.local_addr()?;
        let is_active = Arc::new(AtomicBool::new(true));

        let thread_is_active = Arc::clone(&is_active);
        let thread_addr = addr.to_string();
        let call_timeout = config.call_timeout;
        let accept_thread = thread::spawn(move || {
            for stream in listener.incoming() {
                if !thread_is_active.load(Ordering::Acquire) {
                    break;
                }
                match stream {
                    Ok(stream) => {
                        let handler = handler.clone();
                        let receiver = thread_addr.clone();
                        thread::spawn(move || {
                            if let Err(err) = stream
                                .set_read_timeout(Some(call_timeout))
                                .and_then(|_| stream.set_write_timeout(Some(call_timeout)))
                            {
                                warn!("{} - Could not set socket timeouts: {}", receiver, err);
                            }
                            handle_connection(stream, &handler, receiver);
                        });
                    },
                    Err(err) => warn!("{} - Could not accept connection: {}", thread_addr, err),
                }
            }
            info!("{} - Killed RPC server", thread_addr);
        });

        Ok(Protocol {
            addr: addr.to_string(),
            local_addr,
            is_active,
            accept_thread: Some(accept_thread),
            config,
        })
    }

    /// Stops accepting connections and waits until the listening socket is closed.
    pub fn shutdown(mut self) {
        self.is_active.store(false, Ordering::Release);
        // wake the blocked accept so it observes the flag
        match TcpStream::connect_timeout(&self.local_addr, self.config.dial_timeout) {
            Ok(_) => {
                if let Some(accept_thread) = self.accept_thread.take() {
                    if accept_thread.join().is_err() {
                        warn!("{} - RPC server thread panicked", self.addr);
                    }
                }
            },
            Err(err) => warn!("{} - Could not wake RPC server: {}", self.addr, err),
        }
    }
}

/// Serves a single request. Connections closed without a request are liveness probes.
fn handle_connection<H: RpcHandler>(mut stream: TcpStream, handler: &H, receiver: String) {
    let request: Request = match read_message(&stream) {
        Ok(request) => request,
        Err(err) => {
            trace!("{} - Connection closed without request: {}", receiver, err);
            return;
        },
    };
    let payload = handler.handle(request);
    if let Err(err) = write_message(&mut stream, &Response { receiver: receiver.clone(), payload }) {
        warn!("{} - Could not send response: {}", receiver, err);
    }
}

/// Dials peers and performs remote calls on behalf of a node.
#[derive(Clone)]
pub struct Client {
    sender: String,
    config: Arc<Config>,
}

impl Client {
    pub fn new(sender: &str, config: Arc<Config>) -> Self {
        Client {
            sender: sender.to_string(),
            config,
        }
    }

    /// Connects to `addr`, giving up after `dial_attempts` attempts of at most `dial_timeout`
    /// each.
    pub fn dial(&self, addr: &str) -> Result<TcpStream> {
        let socket_addr = resolve(addr)?;
        let mut last_err = None;
        for attempt in 0..self.config.dial_attempts {
            match TcpStream::connect_timeout(&socket_addr, self.config.dial_timeout) {
                Ok(stream) => return Ok(stream),
                Err(err) => {
                    trace!(
                        "{} - Dial attempt {} to {} failed: {}",
                        self.sender,
                        attempt + 1,
                        addr,
                        err
                    );
                    last_err = Some(err);
                },
            }
        }
        debug!(
            "{} - Could not dial {}: {:?}",
            self.sender, addr, last_err
        );
        Err(Error::UnreachablePeer(addr.to_string()))
    }

    /// Returns `true` if `addr` accepts connections. The empty address is never online.
    pub fn is_online(&self, addr: &str) -> bool {
        !addr.is_empty() && self.dial(addr).is_ok()
    }

    /// Invokes `payload` on `addr` and returns the result. A handler failure is reported as
    /// `Error::RemoteMethod`.
    pub fn call(&self, addr: &str, payload: RequestPayload) -> Result<ResponsePayload> {
        let method = payload.method_name();
        let mut stream = self.dial(addr)?;
        stream.set_read_timeout(Some(self.config.call_timeout))?;
        stream.set_write_timeout(Some(self.config.call_timeout))?;
        debug!("{} - Sending {} to {}", self.sender, method, addr);

        write_message(
            &mut stream,
            &Request {
                sender: self.sender.clone(),
                payload,
            },
        )?;
        let response: Response = read_message(&stream)?;
        match response.payload {
            ResponsePayload::Error(message) => {
                debug!(
                    "{} - {} on {} failed: {}",
                    self.sender, method, response.receiver, message
                );
                Err(Error::RemoteMethod { method, message })
            },
            payload => Ok(payload),
        }
    }
}
