//! The JDWP connection: handshake, reply multiplexing, event decoding.

use crate::jdwp::consts::*;
use crate::jdwp::packet::*;
use crate::prelude::*;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::mpsc::unbounded_channel;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;
use tracing::warn;

#[derive(Debug, Clone)]
/// One decoded event out of a composite event packet.
pub enum JdwpEvent {
  VmStart,
  VmDeath,
  Breakpoint {
    request_id: i32,
    thread: u64,
    location: JdwpLocation,
  },
  ClassPrepare {
    request_id: i32,
    type_id: u64,
    signature: String,
  },
  Exception {
    request_id: i32,
    thread: u64,
    location: JdwpLocation,
    exception: u64,
    caught: bool,
  },
  MethodEntry {
    request_id: i32,
    thread: u64,
    location: JdwpLocation,
  },
  MethodExit {
    request_id: i32,
    thread: u64,
    location: JdwpLocation,
  },
  SingleStep {
    request_id: i32,
    thread: u64,
    location: JdwpLocation,
  },
}

#[derive(Debug, Clone)]
/// Events delivered together under one suspend policy.
pub struct JdwpComposite {
  pub suspend_policy: u8,
  pub events: Vec<JdwpEvent>,
}

type PendingReply = oneshot::Sender<VmResult<Vec<u8>>>;

#[derive(Debug)]
struct ClientInner {
  writer: tokio::sync::Mutex<OwnedWriteHalf>,
  pending: Mutex<HashMap<u32, PendingReply>>,
  seq: AtomicU32,
  sizes: OnceCell<IdSizes>,
  cancel: CancellationToken,
}

#[derive(Debug, Clone)]
/// Shared handle to an attached JDWP connection.
pub struct JdwpClient {
  inner: Arc<ClientInner>,
}

impl JdwpClient {
  /// Socket-attaches to `host:port`: TCP connect, handshake, reader task,
  /// id-size negotiation. Returns the client plus the event stream, which
  /// completes when the target goes away.
  pub async fn connect(
    host: &str,
    port: u16,
  ) -> IoResult<(Self, UnboundedReceiver<JdwpComposite>)> {
    let mut stream = TcpStream::connect((host, port)).await?;
    stream.write_all(HANDSHAKE).await?;
    let mut answer = [0u8; HANDSHAKE.len()];
    stream.read_exact(&mut answer).await?;
    if &answer != HANDSHAKE {
      return Err(IoErr::new(
        IoErrKind::InvalidData,
        "target did not answer the JDWP handshake",
      ));
    }

    let (read_half, write_half) = stream.into_split();
    let (events_tx, events_rx) = unbounded_channel();
    let inner = Arc::new(ClientInner {
      writer: tokio::sync::Mutex::new(write_half),
      pending: Mutex::new(HashMap::new()),
      seq: AtomicU32::new(1),
      sizes: OnceCell::new(),
      cancel: CancellationToken::new(),
    });
    let client = Self {
      inner: inner.clone(),
    };
    tokio::spawn(read_loop(inner, read_half, events_tx));

    match client.fetch_id_sizes().await {
      Ok(sizes) => {
        let _ = client.inner.sizes.set(sizes);
      }
      Err(err) => {
        warn!("id-size negotiation failed, using defaults: {err}");
      }
    }
    debug!(?host, port, "attached to debug target");
    Ok((client, events_rx))
  }

  pub fn sizes(&self) -> IdSizes {
    self.inner.sizes.get().copied().unwrap_or_default()
  }

  pub fn writer(&self) -> PacketWriter {
    PacketWriter::new(self.sizes())
  }

  pub fn shutdown(&self) {
    self.inner.cancel.cancel();
  }

  /// Sends one command and awaits its reply payload.
  pub async fn command(
    &self,
    command: (u8, u8),
    payload: Vec<u8>,
  ) -> VmResult<PacketReader> {
    if self.inner.cancel.is_cancelled() {
      return Err(VmErr::Disconnected);
    }
    let id = self.inner.seq.fetch_add(1, Ordering::Relaxed);
    let (tx, rx) = oneshot::channel();
    self.inner.pending.lock().insert(id, tx);

    let bytes = encode_command(id, command, &payload);
    {
      let mut writer = self.inner.writer.lock().await;
      if let Err(err) = writer.write_all(&bytes).await {
        self.inner.pending.lock().remove(&id);
        return Err(VmErr::Io(err));
      }
    }
    trace!(id, set = command.0, cmd = command.1, "jdwp command sent");

    let payload = rx.await.map_err(|_| VmErr::Disconnected)??;
    Ok(PacketReader::new(payload, self.sizes()))
  }

  async fn fetch_id_sizes(&self) -> VmResult<IdSizes> {
    let mut r = self.command(VM_ID_SIZES, vec![]).await?;
    Ok(IdSizes {
      field: r.int()? as u8,
      method: r.int()? as u8,
      object: r.int()? as u8,
      reference: r.int()? as u8,
      frame: r.int()? as u8,
    })
  }
}

async fn read_loop(
  inner: Arc<ClientInner>,
  mut reader: OwnedReadHalf,
  events_tx: UnboundedSender<JdwpComposite>,
) {
  loop {
    let mut header_bytes = [0u8; HEADER_LEN];
    let read = tokio::select! {
      r = reader.read_exact(&mut header_bytes) => r,
      _ = inner.cancel.cancelled() => break,
    };
    if read.is_err() {
      break;
    }
    let header = PacketHeader::decode(&header_bytes);
    let body_len = (header.length as usize).saturating_sub(HEADER_LEN);
    let mut body = vec![0u8; body_len];
    if reader.read_exact(&mut body).await.is_err() {
      break;
    }

    if header.is_reply() {
      let Some(tx) = inner.pending.lock().remove(&header.id) else {
        warn!(id = header.id, "reply for unknown packet id");
        continue;
      };
      let result = match header.error_code() {
        ERR_NONE => Ok(body),
        code => Err(VmErr::Jdwp(code)),
      };
      let _ = tx.send(result);
      continue;
    }

    if header.command() != EVENT_COMPOSITE {
      warn!(code = header.code, "unexpected command packet from target");
      continue;
    }
    let sizes = inner.sizes.get().copied().unwrap_or_default();
    match decode_composite(body, sizes) {
      Ok(composite) => {
        let death = composite
          .events
          .iter()
          .any(|e| matches!(e, JdwpEvent::VmDeath));
        if events_tx.send(composite).is_err() {
          break;
        }
        if death {
          break;
        }
      }
      Err(err) => warn!("dropping undecodable event packet: {err}"),
    }
  }
  // Completes the event stream and fails all in-flight commands.
  inner.cancel.cancel();
  let pending: Vec<PendingReply> = {
    let mut map = inner.pending.lock();
    map.drain().map(|(_, tx)| tx).collect()
  };
  for tx in pending {
    let _ = tx.send(Err(VmErr::Disconnected));
  }
  debug!("jdwp read loop finished");
}

fn decode_composite(
  body: Vec<u8>,
  sizes: IdSizes,
) -> VmResult<JdwpComposite> {
  let mut r = PacketReader::new(body, sizes);
  let suspend_policy = r.byte()?;
  let count = r.int()?;
  let mut events = Vec::with_capacity(count.max(0) as usize);
  for _ in 0..count {
    let kind = r.byte()?;
    let request_id = r.int()?;
    let event = match kind {
      EVENT_VM_START => {
        let _thread = r.object_id()?;
        JdwpEvent::VmStart
      }
      EVENT_VM_DEATH => JdwpEvent::VmDeath,
      EVENT_BREAKPOINT => JdwpEvent::Breakpoint {
        request_id,
        thread: r.object_id()?,
        location: r.location()?,
      },
      EVENT_SINGLE_STEP => JdwpEvent::SingleStep {
        request_id,
        thread: r.object_id()?,
        location: r.location()?,
      },
      EVENT_METHOD_ENTRY => JdwpEvent::MethodEntry {
        request_id,
        thread: r.object_id()?,
        location: r.location()?,
      },
      EVENT_METHOD_EXIT => JdwpEvent::MethodExit {
        request_id,
        thread: r.object_id()?,
        location: r.location()?,
      },
      EVENT_CLASS_PREPARE => {
        let _thread = r.object_id()?;
        let _ref_type_tag = r.byte()?;
        let type_id = r.reference_id()?;
        let signature = r.string()?;
        let _status = r.int()?;
        JdwpEvent::ClassPrepare {
          request_id,
          type_id,
          signature,
        }
      }
      EVENT_EXCEPTION => {
        let thread = r.object_id()?;
        let location = r.location()?;
        let exception = match r.tagged_value()? {
          JdwpValue::Object { id, .. } => id,
          _ => return Err(VmErr::Protocol("exception event without object")),
        };
        let catch_location = r.location()?;
        JdwpEvent::Exception {
          request_id,
          thread,
          location,
          exception,
          caught: catch_location.class != 0,
        }
      }
      _ => return Err(VmErr::Protocol("unknown event kind")),
    };
    events.push(event);
  }
  Ok(JdwpComposite {
    suspend_policy,
    events,
  })
}
