//! Logical stream multiplexer running over a single ordered byte pipe.
//!
//! One [`MuxSession`] owns the pipe and demultiplexes it into many independent streams
//! (OPEN/DATA/WINDOW/CLOSE/RST), each backed by its own flow-controlled channel. Callers drive
//! new outbound streams through the [`MuxApiRequest`] channel and are notified of outcomes via
//! [`MuxApiResponse`].
//!
//! Stream ids are shared between both ends: whichever side sends OPEN picks the id, and the
//! peer addresses the same stream with that value. OPEN carries no payload, so establishment is
//! optimistic — the initiator may start writing DATA right after sending OPEN, and a dial
//! failure on the accepting side surfaces only as an eventual RST.

#[macro_use]
extern crate tracing;

mod codec;
mod config;
mod id_allocator;

pub use self::config::MuxConfig;
pub use mux_proto::{ResetReason, StreamId};

use self::codec::{MuxCodec, INITIAL_WINDOW_SIZE, MAXIMUM_PACKET_SIZE_IN_BYTES};
use self::id_allocator::IdAllocator;
use anyhow::Context as _;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use mux_proto::Message;
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{Instrument as _, Span};

/// Any duplex, byte-oriented object a stream can be bridged to: a live TCP socket on the agent
/// side, or one half of a `tokio::io::duplex()` pair used to splice a local handshake in front
/// of the real socket.
pub trait AsyncDuplex: AsyncRead + AsyncWrite + Unpin + Send {}
impl<S: AsyncRead + AsyncWrite + Unpin + Send> AsyncDuplex for S {}

pub type ApiResponseSender = oneshot::Sender<MuxApiResponse>;
pub type ApiResponseReceiver = oneshot::Receiver<MuxApiResponse>;
pub type ApiRequestSender = mpsc::Sender<MuxApiRequest>;
pub type ApiRequestReceiver = mpsc::Receiver<MuxApiRequest>;

pub enum MuxApiRequest {
    /// Allocates a stream id and sends OPEN. Succeeds as soon as an id is available; the stream
    /// is not actually bridged to anything until a matching [`MuxApiRequest::Start`] arrives.
    OpenStream { api_response_tx: ApiResponseSender },
    /// Attaches a local duplex to a previously opened stream so the multiplexer can start
    /// bridging bytes both ways.
    Start {
        id: StreamId,
        stream: Box<dyn AsyncDuplex>,
        /// Leftover bytes already read off the accepted socket, forwarded before anything else.
        leftover: Option<Bytes>,
    },
}

#[derive(Debug)]
pub enum MuxApiResponse {
    Success { id: StreamId },
    Failure { reason: &'static str },
}

pub struct MuxSession {
    cfg: MuxConfig,
    api_request_rx: Option<ApiRequestReceiver>,
    mux_reader: Box<dyn AsyncRead + Unpin + Send>,
    mux_writer: Box<dyn AsyncWrite + Unpin + Send>,
}

impl MuxSession {
    pub fn new(mux_reader: Box<dyn AsyncRead + Unpin + Send>, mux_writer: Box<dyn AsyncWrite + Unpin + Send>) -> Self {
        Self {
            cfg: MuxConfig::default(),
            api_request_rx: None,
            mux_reader,
            mux_writer,
        }
    }

    pub fn with_config(mut self, cfg: MuxConfig) -> Self {
        self.cfg = cfg;
        self
    }

    pub fn with_requester_api(mut self, api_request_rx: ApiRequestReceiver) -> Self {
        self.api_request_rx = Some(api_request_rx);
        self
    }

    pub fn spawn(self) -> JoinHandle<anyhow::Result<()>> {
        let fut = self.run();
        tokio::spawn(fut)
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let span = Span::current();
        run_session_impl(self, span.clone()).instrument(span).await
    }
}

async fn run_session_impl(proxy: MuxSession, span: Span) -> anyhow::Result<()> {
    let MuxSession {
        cfg,
        api_request_rx,
        mux_reader,
        mux_writer,
    } = proxy;

    let (msg_to_send_tx, msg_to_send_rx) = mpsc::unbounded_channel::<Message>();

    let mux_stream = FramedRead::new(mux_reader, MuxCodec);
    let mux_sink = FramedWrite::new(mux_writer, MuxCodec);

    let sender_task_handle = SenderTask { mux_sink, msg_to_send_rx }.spawn(span.clone());

    let api_request_rx = api_request_rx.unwrap_or_else(|| mpsc::channel(1).1);

    let scheduler_task_handle = SchedulerTask {
        cfg,
        mux_stream,
        msg_to_send_tx,
        api_request_rx,
        parent_span: span,
    }
    .spawn();

    match tokio::try_join!(scheduler_task_handle.join(), sender_task_handle.join()).context("task join failed")? {
        (Ok(_), Err(e)) => debug!("Sender task failed: {}", e),
        (Err(e), Ok(_)) => debug!("Scheduler task failed: {}", e),
        (Err(scheduler_e), Err(sender_e)) => {
            // Usually, it's only of interest when both tasks are failed.
            anyhow::bail!("both scheduler and sender tasks failed: {} & {}", scheduler_e, sender_e)
        }
        (Ok(_), Ok(_)) => {}
    }

    Ok(())
}

// === implementation details === //

struct ChannelCtx {
    id: StreamId,

    /// We have sent our CLOSE for this stream.
    local_closed: bool,
    /// The peer has sent its CLOSE for this stream.
    distant_closed: bool,

    window_size_updated: Arc<Notify>,
    window_size: Arc<AtomicUsize>,

    span: Span,
}

struct MuxCtx {
    id_allocator: IdAllocator<StreamId>,
    channels: HashMap<StreamId, ChannelCtx>,
}

impl MuxCtx {
    fn new() -> Self {
        Self {
            id_allocator: IdAllocator::<StreamId>::new(),
            channels: HashMap::new(),
        }
    }

    fn allocate_id(&mut self) -> Option<StreamId> {
        self.id_allocator.alloc()
    }

    fn register_channel(&mut self, channel: ChannelCtx) -> anyhow::Result<()> {
        if let Some(replaced_channel) = self.channels.insert(channel.id, channel) {
            anyhow::bail!("detected two streams with the same id {}", replaced_channel.id);
        };
        Ok(())
    }

    fn get_channel(&mut self, id: StreamId) -> Option<&ChannelCtx> {
        self.channels.get(&id)
    }

    fn get_channel_mut(&mut self, id: StreamId) -> Option<&mut ChannelCtx> {
        self.channels.get_mut(&id)
    }

    fn unregister(&mut self, id: StreamId) {
        self.channels.remove(&id);
        self.id_allocator.free(id);
    }
}

type MessageReceiver = mpsc::UnboundedReceiver<Message>;
type MessageSender = mpsc::UnboundedSender<Message>;
type DataReceiver = mpsc::UnboundedReceiver<Bytes>;
type DataSender = mpsc::UnboundedSender<Bytes>;
type InternalMessageSender = mpsc::UnboundedSender<InternalMessage>;

enum InternalMessage {
    /// Our side of the stream has nothing more to read (the local half closed).
    LocalClosed { id: StreamId },
    Reset { id: StreamId, reason: ResetReason },
    StreamResolved { channel: ChannelCtx, stream: Box<dyn AsyncDuplex> },
}

// === internal tasks === //

// ---------------------- //

struct SenderTask<T: AsyncWrite + Unpin + Send + 'static> {
    mux_sink: FramedWrite<T, MuxCodec>,
    msg_to_send_rx: MessageReceiver,
}

impl<T: AsyncWrite + Unpin + Send + 'static> SenderTask<T> {
    fn spawn(self, span: Span) -> ChildTask<anyhow::Result<()>> {
        let fut = self.run().instrument(span);
        ChildTask(tokio::spawn(fut))
    }

    #[instrument("sender", skip_all)]
    async fn run(self) -> anyhow::Result<()> {
        let Self {
            mut mux_sink,
            mut msg_to_send_rx,
        } = self;

        while let Some(msg) = msg_to_send_rx.recv().await {
            trace!(?msg, "Send channel message");
            mux_sink.feed(msg).await?;
            mux_sink.flush().await?;
        }

        info!("Closing multiplexer sender task...");

        Ok(())
    }
}

// ---------------------- //

struct SchedulerTask<T: AsyncRead + Unpin + Send + 'static> {
    cfg: MuxConfig,
    mux_stream: FramedRead<T, MuxCodec>,
    msg_to_send_tx: MessageSender,
    api_request_rx: ApiRequestReceiver,
    parent_span: Span,
}

impl<T: AsyncRead + Unpin + Send + 'static> SchedulerTask<T> {
    fn spawn(self) -> ChildTask<anyhow::Result<()>> {
        let parent_span = self.parent_span.clone();
        let fut = scheduler_task_impl(self).instrument(parent_span);
        ChildTask(tokio::spawn(fut))
    }
}

#[instrument("scheduler", skip_all)]
async fn scheduler_task_impl<T: AsyncRead + Unpin + Send + 'static>(task: SchedulerTask<T>) -> anyhow::Result<()> {
    let SchedulerTask {
        cfg,
        mut mux_stream,
        msg_to_send_tx,
        mut api_request_rx,
        parent_span,
    } = task;

    let mut mux_ctx = MuxCtx::new();
    let mut data_senders: HashMap<StreamId, DataSender> = HashMap::new();
    let (internal_msg_tx, mut internal_msg_rx) = mpsc::unbounded_channel::<InternalMessage>();

    // Safety net against poor AsyncRead trait implementations.
    const MAX_CONSECUTIVE_PIPE_FAILURES: u8 = 5;
    let mut nb_consecutive_pipe_failures = 0;

    loop {
        // NOTE: Current task is the "multiplexer scheduler".
        // It handles the channel registry and communicates with other tasks.
        // As such, it should process messages continuously and never wait during processing: no `await` keyword
        // must be seen inside this select block.
        // It's also expected to be resilient and `?` operator should be used only for
        // unrecoverable failures.

        tokio::select! {
            Some(request) = api_request_rx.recv() => {
                match request {
                    MuxApiRequest::OpenStream { api_response_tx } => {
                        match mux_ctx.allocate_id() {
                            Some(id) => {
                                trace!(%id, "Allocated stream id");

                                let channel = ChannelCtx {
                                    id,
                                    local_closed: false,
                                    distant_closed: false,
                                    window_size_updated: Arc::new(Notify::new()),
                                    window_size: Arc::new(AtomicUsize::new(INITIAL_WINDOW_SIZE as usize)),
                                    span: info_span!(parent: parent_span.clone(), "stream", %id),
                                };

                                mux_ctx.register_channel(channel)?;

                                msg_to_send_tx
                                    .send(Message::open(id))
                                    .context("couldn't send OPEN message through mpsc channel")?;

                                let _ = api_response_tx.send(MuxApiResponse::Success { id });
                            }
                            None => {
                                warn!("Couldn't allocate stream id for API request: no more ids available");
                                let _ = api_response_tx.send(MuxApiResponse::Failure {
                                    reason: "no more stream ids available",
                                });
                            }
                        }
                    }
                    MuxApiRequest::Start { id, stream, leftover } => {
                        let channel = mux_ctx.get_channel(id).with_context(|| format!("couldn't find stream with id {id}"))?;

                        let (data_tx, data_rx) = mpsc::unbounded_channel::<Bytes>();

                        if data_senders.insert(id, data_tx).is_some() {
                            anyhow::bail!("detected two streams with the same id {}", id);
                        }

                        // Send leftover bytes if any
                        if let Some(leftover) = leftover {
                            if let Err(error) = msg_to_send_tx.send(Message::data(id, leftover)) {
                                error!(%error, "Couldn't send leftover bytes");
                            }
                        }

                        let (reader, writer) = tokio::io::split(stream);

                        DataWriterTask { writer, data_rx }.spawn(channel.span.clone()).detach();

                        DataReaderTask {
                            reader,
                            id,
                            window_size_updated: Arc::clone(&channel.window_size_updated),
                            window_size: Arc::clone(&channel.window_size),
                            msg_to_send_tx: msg_to_send_tx.clone(),
                            internal_msg_tx: internal_msg_tx.clone(),
                        }
                        .spawn(channel.span.clone())
                        .detach();
                    }
                }
            }
            Some(internal_msg) = internal_msg_rx.recv() => {
                match internal_msg {
                    InternalMessage::LocalClosed { id } => {
                        let channel = match mux_ctx.get_channel_mut(id) {
                            Some(channel) => channel,
                            None => continue,
                        };
                        let channel_span = channel.span.clone();

                        if !channel.local_closed {
                            channel.local_closed = true;
                            msg_to_send_tx
                                .send(Message::close(id))
                                .context("couldn't send CLOSE message")?;
                        }

                        if channel.local_closed && channel.distant_closed {
                            mux_ctx.unregister(id);
                            channel_span.in_scope(|| debug!("Stream closed"));
                        }
                    }
                    InternalMessage::Reset { id, reason } => {
                        if let Some(channel) = mux_ctx.get_channel(id) {
                            channel.span.in_scope(|| {
                                debug!(%reason, "Stream reset");
                            });
                            data_senders.remove(&id);
                            mux_ctx.unregister(id);
                            msg_to_send_tx
                                .send(Message::reset(id, reason))
                                .context("couldn't send RESET message")?;
                        }
                    }
                    InternalMessage::StreamResolved { channel, stream } => {
                        let id = channel.id;
                        let window_size_updated = Arc::clone(&channel.window_size_updated);
                        let window_size = Arc::clone(&channel.window_size);
                        let channel_span = channel.span.clone();

                        let (data_tx, data_rx) = mpsc::unbounded_channel::<Bytes>();

                        if data_senders.insert(id, data_tx).is_some() {
                            anyhow::bail!("detected two streams with the same id {}", id);
                        };

                        mux_ctx.register_channel(channel)?;

                        channel_span.in_scope(|| {
                            debug!("Stream accepted");
                        });

                        let (reader, writer) = tokio::io::split(stream);

                        DataWriterTask { writer, data_rx }.spawn(channel_span.clone()).detach();

                        DataReaderTask {
                            reader,
                            id,
                            window_size_updated,
                            window_size,
                            msg_to_send_tx: msg_to_send_tx.clone(),
                            internal_msg_tx: internal_msg_tx.clone(),
                        }
                        .spawn(channel_span)
                        .detach();
                    }
                }
            }
            msg = mux_stream.next() => {
                let msg = match msg {
                    Some(msg) => msg,
                    None => {
                        info!("tunnel pipe was closed by peer");
                        break;
                    }
                };

                let msg = match msg {
                    Ok(msg) => {
                        nb_consecutive_pipe_failures = 0;
                        msg
                    },
                    Err(error) => {
                        let really_an_error = is_really_an_error(&error);

                        let error = anyhow::Error::new(error);

                        if really_an_error {
                            error!(error = format!("{error:#}"), "tunnel pipe error");
                        } else {
                            info!(reason = format!("{error:#}"), "tunnel pipe closed abruptly");
                        }

                        nb_consecutive_pipe_failures += 1;
                        if nb_consecutive_pipe_failures > MAX_CONSECUTIVE_PIPE_FAILURES {
                            // Some underlying `AsyncRead` implementations might handle errors poorly
                            // and cause infinite polling on errors such as broken pipe (this should
                            // stop instead of returning the same error indefinitely).
                            // Hence, this safety net to escape from such infinite loops.
                            anyhow::bail!("forced stream multiplexer shutdown because of too many consecutive pipe failures");
                        } else {
                            continue;
                        }
                    }
                };

                trace!(?msg, "Received channel message");

                match msg {
                    Message::Open(msg) => {
                        let id = StreamId::from(msg.stream_id);

                        let egress_addr = match cfg.egress_addr {
                            Some(addr) => addr,
                            None => {
                                warn!(%id, "Received OPEN but this session never accepts streams");
                                msg_to_send_tx
                                    .send(Message::reset(id, ResetReason::ProtocolViolation))
                                    .context("couldn't send RESET message")?;
                                continue;
                            }
                        };

                        if mux_ctx.get_channel(id).is_some() {
                            warn!(%id, "OPEN for a stream id already in use");
                            msg_to_send_tx
                                .send(Message::reset(id, ResetReason::ProtocolViolation))
                                .context("couldn't send RESET message")?;
                            continue;
                        }

                        trace!(%id, "Accepting stream");

                        let channel_span = info_span!(parent: parent_span.clone(), "stream", %id);

                        let channel = ChannelCtx {
                            id,
                            local_closed: false,
                            distant_closed: false,
                            window_size_updated: Arc::new(Notify::new()),
                            window_size: Arc::new(AtomicUsize::new(INITIAL_WINDOW_SIZE as usize)),
                            span: channel_span,
                        };

                        StreamResolverTask {
                            channel,
                            egress_addr,
                            internal_msg_tx: internal_msg_tx.clone(),
                            msg_to_send_tx: msg_to_send_tx.clone(),
                        }
                        .spawn()
                        .detach();
                    }
                    Message::Window(msg) => {
                        if let Some(ctx) = mux_ctx.get_channel_mut(StreamId::from(msg.stream_id)) {
                            ctx.window_size.fetch_add(msg.delta as usize, Ordering::SeqCst);
                            ctx.window_size_updated.notify_one();
                        }
                    }
                    Message::Data(msg) => {
                        let id = StreamId::from(msg.stream_id);
                        let data_length = msg.payload.len() as u32;

                        if mux_ctx.get_channel(id).is_none() {
                            warn!(%id, "Couldn't find stream for DATA message");
                            continue;
                        }

                        match data_senders.get_mut(&id) {
                            Some(sender) => {
                                let _ = sender.send(msg.payload);
                            }
                            None => warn!(%id, "Received data but associated data sender is missing"),
                        }

                        // Simplest flow control logic for now: just send back a WINDOW message to
                        // increase back peer's window size.
                        msg_to_send_tx
                            .send(Message::window(id, data_length))
                            .context("couldn't send WINDOW message")?;
                    }
                    Message::Close(msg) => {
                        let id = StreamId::from(msg.stream_id);
                        let channel = match mux_ctx.get_channel_mut(id) {
                            Some(channel) => channel,
                            None => {
                                warn!(%id, "Couldn't find stream for CLOSE message");
                                continue;
                            },
                        };

                        channel.distant_closed = true;
                        channel.span.in_scope(|| {
                            debug!("Distant peer closed");
                        });

                        // This will also shut down the associated stream's write half.
                        data_senders.remove(&id);

                        if channel.local_closed {
                            mux_ctx.unregister(id);
                            trace!(%id, "Stream closed");
                        }
                    }
                    Message::Reset(msg) => {
                        let id = StreamId::from(msg.stream_id);

                        if mux_ctx.get_channel(id).is_some() {
                            warn!(%id, reason = %msg.reason, "Distant peer reset stream");
                            data_senders.remove(&id);
                            mux_ctx.unregister(id);
                        }
                    }
                }
            }
        }
    }

    info!("Closing multiplexer scheduler task...");

    Ok(())
}

// ---------------------- //

struct DataReaderTask {
    reader: ReadHalf<Box<dyn AsyncDuplex>>,
    id: StreamId,
    window_size_updated: Arc<Notify>,
    window_size: Arc<AtomicUsize>,
    msg_to_send_tx: MessageSender,
    internal_msg_tx: InternalMessageSender,
}

impl DataReaderTask {
    fn spawn(self, span: Span) -> ChildTask<()> {
        let handle = tokio::spawn(
            async move {
                if let Err(error) = self.run().await {
                    debug!(%error, "Reader task failed");
                }
            }
            .instrument(span),
        );
        ChildTask(handle)
    }

    async fn run(self) -> anyhow::Result<()> {
        let Self {
            reader,
            id,
            window_size_updated,
            window_size,
            msg_to_send_tx,
            internal_msg_tx,
        } = self;

        let codec = tokio_util::codec::BytesCodec::new();
        let mut bytes_stream = FramedRead::new(reader, codec);

        trace!("Started forwarding");

        while let Some(bytes) = bytes_stream.next().await {
            let bytes = match bytes {
                Ok(bytes) => bytes,
                Err(error) if is_really_an_error(&error) => {
                    let _ = internal_msg_tx.send(InternalMessage::Reset {
                        id,
                        reason: ResetReason::TransportFailure,
                    });
                    return Err(anyhow::Error::new(error).context("couldn't read next bytes from stream"));
                }
                Err(error) => {
                    debug!(%error, "Couldn't read next bytes from stream (not really an error)");
                    break;
                }
            };

            let mut bytes = bytes.freeze();

            while !bytes.is_empty() {
                let chunk_len = std::cmp::min(MAXIMUM_PACKET_SIZE_IN_BYTES, bytes.len());
                let mut chunk = bytes.split_to(chunk_len);

                loop {
                    let window_size_now = window_size.load(Ordering::SeqCst);
                    if window_size_now < chunk.len() {
                        trace!(
                            window_size_now,
                            full_packet_size = chunk.len(),
                            "Window size insufficient to send full packet. Truncate and wait."
                        );

                        if window_size_now > 0 {
                            let send_now = chunk.split_to(window_size_now);
                            window_size.fetch_sub(send_now.len(), Ordering::SeqCst);
                            msg_to_send_tx
                                .send(Message::data(id, send_now))
                                .context("couldn't send DATA message")?;
                        }

                        window_size_updated.notified().await;
                    } else {
                        window_size.fetch_sub(chunk.len(), Ordering::SeqCst);
                        msg_to_send_tx
                            .send(Message::data(id, chunk))
                            .context("couldn't send DATA message")?;
                        break;
                    }
                }
            }
        }

        trace!("Finished forwarding (EOF)");

        // Attempt to let the scheduler know the local half is done.
        // When the tunnel pipe is closed, it is common for the internal channel receiver to have already been dropped and closed.
        // Therefore, we ignore the "SendError" returned by `send`.
        let _ = internal_msg_tx.send(InternalMessage::LocalClosed { id });

        Ok(())
    }
}

// ---------------------- //

struct DataWriterTask {
    writer: WriteHalf<Box<dyn AsyncDuplex>>,
    data_rx: DataReceiver,
}

impl DataWriterTask {
    fn spawn(self, span: Span) -> ChildTask<()> {
        let Self { mut writer, mut data_rx } = self;

        let handle = tokio::spawn(
            async move {
                while let Some(data) = data_rx.recv().await {
                    if let Err(error) = writer.write_all(&data).await {
                        warn!(%error, "Writer task failed");
                        break;
                    }
                }
            }
            .instrument(span),
        );

        ChildTask(handle)
    }
}

// ---------------------- //

/// Dials the local egress for a stream the peer just opened. The multiplexer itself stays
/// destination-agnostic: it blindly bridges bytes to whatever is listening at `egress_addr`,
/// which negotiates the actual destination out of band (e.g. as a SOCKS5 server receiving the
/// initiator's own inner handshake, carried transparently as this stream's DATA bytes).
struct StreamResolverTask {
    channel: ChannelCtx,
    egress_addr: SocketAddr,
    internal_msg_tx: InternalMessageSender,
    msg_to_send_tx: MessageSender,
}

impl StreamResolverTask {
    fn spawn(self) -> ChildTask<()> {
        let span = self.channel.span.clone();

        let handle = tokio::spawn(
            async move {
                if let Err(error) = self.run().await {
                    warn!(%error, "Resolver task failed");
                }
            }
            .instrument(span),
        );

        ChildTask(handle)
    }

    async fn run(self) -> anyhow::Result<()> {
        let Self {
            channel,
            egress_addr,
            internal_msg_tx,
            msg_to_send_tx,
        } = self;

        let id = channel.id;

        match TcpStream::connect(egress_addr).await {
            Ok(stream) => {
                internal_msg_tx
                    .send(InternalMessage::StreamResolved {
                        channel,
                        stream: Box::new(stream),
                    })
                    .context("couldn't send back resolved stream through internal mpsc channel")?;
            }
            Err(error) => {
                debug!(%error, %egress_addr, "Egress dial failed");
                msg_to_send_tx
                    .send(Message::reset(id, ResetReason::TransportFailure))
                    .context("couldn't send RESET message")?;
                anyhow::bail!("couldn't reach egress {}: {}", egress_addr, error);
            }
        }

        Ok(())
    }
}

/// Aborts the running task when dropped.
/// Also see https://github.com/tokio-rs/tokio/issues/1830 for some background.
#[must_use]
struct ChildTask<T>(JoinHandle<T>);

impl<T> ChildTask<T> {
    async fn join(mut self) -> Result<T, tokio::task::JoinError> {
        (&mut self.0).await
    }

    fn abort(&self) {
        self.0.abort()
    }

    fn detach(self) {
        core::mem::forget(self);
    }
}

impl<T> Drop for ChildTask<T> {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Walks source chain and check for status codes like ECONNRESET or ECONNABORTED that we don't consider to be actual errors
fn is_really_an_error(original_error: &(dyn std::error::Error + 'static)) -> bool {
    let mut dyn_error: Option<&dyn std::error::Error> = Some(original_error);

    while let Some(source_error) = dyn_error.take() {
        if let Some(io_error) = source_error.downcast_ref::<io::Error>() {
            match io_error.kind() {
                io::ErrorKind::ConnectionReset | io::ErrorKind::UnexpectedEof | io::ErrorKind::ConnectionAborted => {
                    return false;
                }
                _ => {}
            }
        }

        dyn_error = source_error.source();
    }

    true
}
