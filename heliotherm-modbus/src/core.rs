use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio_modbus::client::{tcp, Client, Context, Reader, Writer};
use tokio_modbus::{Address, Quantity, Slave};
use tracing::{debug, warn};

use crate::codec::{RawBlock, RawWrite, Word};
use crate::config::GatewayConfig;
use crate::error::{Result, TransportError};
use crate::register::{RegisterClass, RegisterSpan};

#[async_trait]
/// Modbus client capability over one device address.
///
/// Implementations map device exception responses to [`TransportError::Exception`] and
/// everything that breaks the connection to the other variants.
pub trait Transport: Send {
    async fn read_coils(
        &mut self,
        addr: Address,
        cnt: Quantity,
    ) -> std::result::Result<Vec<bool>, TransportError>;

    async fn read_discrete_inputs(
        &mut self,
        addr: Address,
        cnt: Quantity,
    ) -> std::result::Result<Vec<bool>, TransportError>;

    async fn read_holding_registers(
        &mut self,
        addr: Address,
        cnt: Quantity,
    ) -> std::result::Result<Vec<Word>, TransportError>;

    async fn read_input_registers(
        &mut self,
        addr: Address,
        cnt: Quantity,
    ) -> std::result::Result<Vec<Word>, TransportError>;

    async fn write_single_coil(
        &mut self,
        addr: Address,
        value: bool,
    ) -> std::result::Result<(), TransportError>;

    async fn write_single_register(
        &mut self,
        addr: Address,
        word: Word,
    ) -> std::result::Result<(), TransportError>;

    async fn disconnect(&mut self) -> std::result::Result<(), TransportError>;
}

#[async_trait]
/// Opens new [`Transport`]s, used by the hub for the first and every later reconnect.
pub trait Connect: Send + Sync {
    async fn connect(&self) -> std::result::Result<Box<dyn Transport>, TransportError>;
}

/// Read the whole `span` of `class` in a single request.
pub async fn read_span(
    transport: &mut dyn Transport,
    class: RegisterClass,
    span: RegisterSpan,
) -> std::result::Result<RawBlock, TransportError> {
    let (addr, cnt) = (span.low, span.count());
    debug!(%class, addr, cnt, "bulk read");
    let block = match class {
        RegisterClass::Coil => RawBlock::Bits(transport.read_coils(addr, cnt).await?),
        RegisterClass::DiscreteInput => {
            RawBlock::Bits(transport.read_discrete_inputs(addr, cnt).await?)
        }
        RegisterClass::HoldingRegister => {
            RawBlock::Words(transport.read_holding_registers(addr, cnt).await?)
        }
        RegisterClass::InputRegister => {
            RawBlock::Words(transport.read_input_registers(addr, cnt).await?)
        }
    };
    Ok(block)
}

/// Write one encoded entity, one request per coil or register word.
pub async fn write_raw(
    transport: &mut dyn Transport,
    address: Address,
    raw: &RawWrite,
) -> std::result::Result<(), TransportError> {
    match raw {
        RawWrite::Coil(bit) => transport.write_single_coil(address, *bit).await,
        RawWrite::Words(words) => {
            for (offset, word) in (0..).zip(words) {
                transport.write_single_register(address + offset, *word).await?;
            }
            Ok(())
        }
    }
}

#[derive(Debug, Clone)]
/// Connects to a Modbus/TCP device with tokio-modbus.
pub struct TcpConnector {
    pub socket_addr: SocketAddr,
    pub unit_id: u8,
    /// Bound for connecting and for every single request.
    pub timeout: Duration,
    /// Extra attempts of a request that timed out.
    pub retries: u32,
}

impl TcpConnector {
    pub fn new(socket_addr: SocketAddr, unit_id: u8) -> Self {
        Self {
            socket_addr,
            unit_id,
            timeout: Duration::from_secs(3),
            retries: 3,
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        Ok(Self {
            socket_addr: config.socket_addr()?,
            unit_id: config.unit_id,
            timeout: config.timeout(),
            retries: config.retries,
        })
    }
}

#[async_trait]
impl Connect for TcpConnector {
    async fn connect(&self) -> std::result::Result<Box<dyn Transport>, TransportError> {
        debug!(addr = %self.socket_addr, unit_id = self.unit_id, "connecting");
        let connecting = tcp::connect_slave(self.socket_addr, Slave(self.unit_id));
        let ctx = match tokio::time::timeout(self.timeout, connecting).await {
            Ok(Ok(ctx)) => ctx,
            Ok(Err(source)) => {
                return Err(TransportError::Connect {
                    addr: self.socket_addr.to_string(),
                    source,
                })
            }
            Err(_) => return Err(TransportError::Timeout(self.timeout)),
        };
        debug!(addr = %self.socket_addr, "connected");

        Ok(Box::new(TcpTransport {
            ctx,
            timeout: self.timeout,
            retries: self.retries,
        }))
    }
}

/// Open tokio-modbus client context.
pub struct TcpTransport {
    ctx: Context,
    timeout: Duration,
    retries: u32,
}

async fn bounded<T>(
    timeout: Duration,
    request: impl Future<Output = tokio_modbus::Result<T>>,
) -> std::result::Result<T, TransportError> {
    match tokio::time::timeout(timeout, request).await {
        Ok(Ok(Ok(value))) => Ok(value),
        Ok(Ok(Err(exception))) => Err(TransportError::Exception(exception.to_string())),
        Ok(Err(err)) => Err(TransportError::Modbus(err)),
        Err(_) => Err(TransportError::Timeout(timeout)),
    }
}

macro_rules! with_retries {
    ($self:ident, $request:expr) => {{
        let mut attempt = 0;
        loop {
            match bounded($self.timeout, $request).await {
                Err(TransportError::Timeout(after)) if attempt < $self.retries => {
                    attempt += 1;
                    warn!(?after, attempt, "request timed out, retrying");
                }
                result => break result,
            }
        }
    }};
}

#[async_trait]
impl Transport for TcpTransport {
    async fn read_coils(
        &mut self,
        addr: Address,
        cnt: Quantity,
    ) -> std::result::Result<Vec<bool>, TransportError> {
        with_retries!(self, self.ctx.read_coils(addr, cnt))
    }

    async fn read_discrete_inputs(
        &mut self,
        addr: Address,
        cnt: Quantity,
    ) -> std::result::Result<Vec<bool>, TransportError> {
        with_retries!(self, self.ctx.read_discrete_inputs(addr, cnt))
    }

    async fn read_holding_registers(
        &mut self,
        addr: Address,
        cnt: Quantity,
    ) -> std::result::Result<Vec<Word>, TransportError> {
        with_retries!(self, self.ctx.read_holding_registers(addr, cnt))
    }

    async fn read_input_registers(
        &mut self,
        addr: Address,
        cnt: Quantity,
    ) -> std::result::Result<Vec<Word>, TransportError> {
        with_retries!(self, self.ctx.read_input_registers(addr, cnt))
    }

    async fn write_single_coil(
        &mut self,
        addr: Address,
        value: bool,
    ) -> std::result::Result<(), TransportError> {
        with_retries!(self, self.ctx.write_single_coil(addr, value))
    }

    async fn write_single_register(
        &mut self,
        addr: Address,
        word: Word,
    ) -> std::result::Result<(), TransportError> {
        with_retries!(self, self.ctx.write_single_register(addr, word))
    }

    async fn disconnect(&mut self) -> std::result::Result<(), TransportError> {
        self.ctx.disconnect().await.map_err(TransportError::from)?;
        Ok(())
    }
}
