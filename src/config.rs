use std::time::Duration;

use anyhow::{bail, Context, Result};
use futures::{Sink, Stream};
use tokio::{fs::File, net::TcpStream};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tokio_util::codec::Framed;
use url::Url;

use crate::protocol::{codec::AquaLogicCodec, frames::Frame};


/// The controller bus runs at 19200 8N2.
pub const DEFAULT_BAUD_RATE: u32 = 19200;


/// Timing and retry settings for a session.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// A connection that delivers no frame for this long is considered dead.
    /// The controller sends keep-alives about once per second.
    pub read_timeout: Duration,

    /// How long after sending a state change to check that it took effect
    pub verify_delay: Duration,

    /// How many times a state change is re-sent when it did not take effect
    pub retries: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(30),
            verify_delay: Duration::from_secs(2),
            retries: 10,
        }
    }
}


pub enum Port {
    Serial(SerialStream),
    TcpRaw(TcpStream),
    /// A raw capture; writes to it fail
    File(File),
}


pub trait PortStream: Stream<Item = std::io::Result<Frame>> + Sink<Frame, Error = std::io::Error> + Send + Unpin {}

impl<T> PortStream for T
where
    T: Stream<Item = std::io::Result<Frame>> + Sink<Frame, Error = std::io::Error> + Send + Unpin,
{}


impl Port {
    /// Open a port from a url.
    ///
    /// `serial:///dev/ttyUSB0?baud=19200`, `tcp+raw://host:port` (e.g. an
    /// RS-485 to Ethernet adapter) and `file:///path/to/capture.bin` are supported.
    pub async fn open(url: &Url) -> Result<Self> {
        match url.scheme() {
            "serial" => {
                let path = url.path();

                let baud = match url.query_pairs().find(|(k, _)| k == "baud") {
                    Some((_, baud)) => baud.parse()
                        .with_context(|| format!("invalid baud rate in url: {url}"))?,
                    None => DEFAULT_BAUD_RATE
                };

                let port = tokio_serial::new(path, baud)
                    .data_bits(tokio_serial::DataBits::Eight)
                    .parity(tokio_serial::Parity::None)
                    .stop_bits(tokio_serial::StopBits::Two)
                    .open_native_async()
                    .with_context(|| format!("failed to open serial port {path}"))
                    ?;

                Ok(Self::Serial(port))
            },
            "tcp+raw" => {
                let host = url.host_str()
                    .with_context(|| format!("tcp+raw requires a host to be specified in the url: {url}"))?;

                let port = url.port()
                    .with_context(|| format!("tcp+raw requires a port number to be specified in the url: {url}"))?;

                let stream = TcpStream::connect((host, port)).await
                    .with_context(|| format!("failed to open tcp+raw connection to: {url}"))?;

                stream.set_nodelay(true)?;

                Ok(Self::TcpRaw(stream))
            },
            "file" => {
                let path = url.to_file_path()
                    .map_err(|_| anyhow::anyhow!("invalid file url: {url}"))?;

                let file = File::open(&path).await
                    .with_context(|| format!("failed to open capture {}", path.display()))?;

                Ok(Self::File(file))
            },
            other => {
                bail!("url scheme {other} not supported");
            }
        }
    }

    pub fn framed(self) -> Box<dyn PortStream> {
        match self {
            Port::Serial(port) => Box::new(Framed::new(port, AquaLogicCodec::new())),
            Port::TcpRaw(stream) => Box::new(Framed::new(stream, AquaLogicCodec::new())),
            Port::File(file) => Box::new(Framed::new(file, AquaLogicCodec::new())),
        }
    }
}
