//! Transport seam between the client and a device.
//!
//! The client treats a transport as an opaque request/response primitive:
//! one APDU in, a status code and a payload out. USB framing lives entirely
//! inside `ledger-transport-hid`.

use std::error::Error;
use std::fmt::Debug;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use ledger_apdu::APDUAnswer;
use ledger_transport_hid::TransportNativeHID;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    sync::Mutex,
};

use crate::apdu::ApduCommand;

pub type TransportError = Box<dyn Error + Send + Sync>;

#[async_trait]
pub trait Transport: Send + Sync {
    type Error: Debug + Send + Sync;
    /// Sends one command and returns the raw status code with the payload.
    async fn exchange(&self, command: &ApduCommand) -> Result<(u16, Vec<u8>), Self::Error>;
}

/// Transport to a physical device over USB HID.
pub struct TransportHid(TransportNativeHID);

impl TransportHid {
    pub fn new(t: TransportNativeHID) -> Self {
        Self(t)
    }
}

#[async_trait]
impl Transport for TransportHid {
    type Error = TransportError;
    async fn exchange(&self, cmd: &ApduCommand) -> Result<(u16, Vec<u8>), Self::Error> {
        self.0
            .exchange(&ledger_apdu::APDUCommand {
                cla: cmd.cla,
                ins: cmd.ins,
                p1: cmd.p1,
                p2: cmd.p2,
                data: cmd.data.clone(),
            })
            .map(|answer| (answer.retcode(), answer.data().to_vec()))
            .map_err(|e| e.into())
    }
}

/// Transport to the Speculos simulator.
pub struct TransportTcp {
    connection: Mutex<TcpStream>,
    total_exchanges: AtomicU64,
    total_sent: AtomicU64,
    total_received: AtomicU64,
}

impl TransportTcp {
    pub async fn new(addr: SocketAddr) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            connection: Mutex::new(stream),
            total_exchanges: AtomicU64::new(0),
            total_sent: AtomicU64::new(0),
            total_received: AtomicU64::new(0),
        })
    }

    /// Connects to the default Speculos address 127.0.0.1:9999.
    pub async fn new_default() -> Result<Self, TransportError> {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 9999);
        Self::new(addr).await
    }

    // Number of exchanges made with this instance. An exchange includes
    // both sending an APDU and receiving a response.
    pub fn total_exchanges(&self) -> u64 {
        self.total_exchanges.load(Ordering::Relaxed)
    }

    pub fn total_sent(&self) -> u64 {
        self.total_sent.load(Ordering::Relaxed)
    }

    pub fn total_received(&self) -> u64 {
        self.total_received.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Transport for TransportTcp {
    type Error = TransportError;
    async fn exchange(&self, command: &ApduCommand) -> Result<(u16, Vec<u8>), Self::Error> {
        self.total_exchanges.fetch_add(1, Ordering::Relaxed);

        let mut stream = self.connection.lock().await;
        let command_bytes = command.encode();

        let mut req = vec![0u8; command_bytes.len() + 4];
        req[..4].copy_from_slice(&(command_bytes.len() as u32).to_be_bytes());
        req[4..].copy_from_slice(&command_bytes);

        stream.write_all(&req).await?;
        self.total_sent
            .fetch_add(req.len() as u64, Ordering::Relaxed);

        let mut buff = [0u8; 4];
        let len = match stream.read(&mut buff).await? {
            4 => u32::from_be_bytes(buff),
            _ => return Err("Invalid Length".into()),
        };
        self.total_received.fetch_add(4, Ordering::Relaxed); // length header

        let mut resp = vec![0u8; len as usize + 2];
        stream.read_exact(&mut resp).await?;
        self.total_received
            .fetch_add(resp.len() as u64, Ordering::Relaxed);

        let answer = APDUAnswer::from_answer(resp).map_err(|_| "Invalid Answer")?;
        Ok((answer.retcode(), answer.data().to_vec()))
    }
}
