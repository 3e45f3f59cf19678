//! A channel driven by a background thread.
//!
//! A [`ThreadedChannel`] moves a [`Channel`] onto a dedicated thread
//! running a single-threaded Tokio runtime. All operations are turned into
//! commands that are queued for that thread and processed in order, so the
//! channel can be shared freely and used from code that doesn’t run on a
//! runtime at all. Only cancellation waits for its command to be processed.
//!
//! Completions are delivered on the background thread: callbacks given to
//! [`ThreadedChannel::submit_with`] are called there and should not block.

use super::addrinfo::AddrInfoHints;
use super::channel::{
    Channel, Completion, Continuation, QueryHandle, QueryId,
};
use super::conf::ResolvConf;
use super::error::Error;
use super::net::NetTransport;
use super::transport::Transport;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use std::{fmt, thread};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

//------------ ThreadedChannel -----------------------------------------------

/// A resolver channel driven by its own thread.
pub struct ThreadedChannel {
    /// The queue of commands for the background thread.
    commands: mpsc::UnboundedSender<Command>,

    /// The ID for the next submission.
    next_id: AtomicU64,

    /// The configuration used by the channel.
    conf: Arc<ResolvConf>,

    /// The background thread.
    thread: Option<JoinHandle<()>>,
}

impl ThreadedChannel {
    /// Opens a channel using the network.
    ///
    /// Both event models are accepted.
    pub fn open(conf: ResolvConf) -> Result<Self, Error> {
        Self::with_transport(conf, NetTransport::new())
    }

    /// Opens a channel using the given transport.
    pub fn with_transport<T>(
        conf: ResolvConf,
        transport: T,
    ) -> Result<Self, Error>
    where
        T: Transport + Send + 'static,
    {
        let channel = Channel::with_transport(conf, transport)?;
        let conf = Arc::new(channel.conf().clone());
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let thread = thread::Builder::new()
            .name("domain-stub".into())
            .spawn(move || runtime.block_on(run(channel, rx)))?;
        Ok(ThreadedChannel {
            commands: tx,
            next_id: AtomicU64::new(0),
            conf,
            thread: Some(thread),
        })
    }

    /// Returns a reference to the configuration.
    pub fn conf(&self) -> &ResolvConf {
        &self.conf
    }

    /// Submits a lookup and returns a handle to its completion.
    ///
    /// The handle can be awaited on any runtime or checked via
    /// [`QueryHandle::try_completion`].
    pub fn submit(
        &self,
        host: &str,
        service: Option<&str>,
        hints: &AddrInfoHints,
    ) -> QueryHandle {
        let id = self.next_query_id();
        let (tx, rx) = oneshot::channel();
        self.send_submit(id, host, service, hints, Continuation::Handle(tx));
        QueryHandle::new(id, rx)
    }

    /// Submits a lookup and calls `callback` upon its completion.
    pub fn submit_with<F>(
        &self,
        host: &str,
        service: Option<&str>,
        hints: &AddrInfoHints,
        callback: F,
    ) -> QueryId
    where
        F: FnOnce(Completion) + Send + 'static,
    {
        let id = self.next_query_id();
        self.send_submit(
            id,
            host,
            service,
            hints,
            Continuation::Callback(Box::new(callback)),
        );
        id
    }

    /// Cancels a query.
    ///
    /// Waits for the background thread to process the cancellation. If
    /// the query was still in flight, it has completed with
    /// [`Error::Cancelled`] by the time the method returns and `true` is
    /// returned. If it had completed already or is unknown, returns
    /// `false`.
    ///
    /// # Panics
    ///
    /// The method panics if called within an asynchronous execution
    /// context, which includes callbacks given to
    /// [`submit_with`][Self::submit_with].
    pub fn cancel(&self, id: QueryId) -> bool {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Cancel(id, tx)).is_err() {
            // The thread is gone and has cancelled everything.
            return false;
        }
        rx.blocking_recv().unwrap_or(false)
    }

    /// Closes the channel and waits for the background thread to finish.
    ///
    /// All queries in flight complete with [`Error::Cancelled`].
    pub fn close(&mut self) {
        let _ = self.commands.send(Command::Close);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("resolver thread panicked");
            }
        }
    }

    fn next_query_id(&self) -> QueryId {
        QueryId::from_int(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn send_submit(
        &self,
        id: QueryId,
        host: &str,
        service: Option<&str>,
        hints: &AddrInfoHints,
        continuation: Continuation,
    ) {
        let command = Command::Submit {
            id,
            host: host.into(),
            service: service.map(Into::into),
            hints: *hints,
            continuation,
        };
        if let Err(mpsc::error::SendError(command)) =
            self.commands.send(command)
        {
            if let Command::Submit { continuation, .. } = command {
                continuation.fire(Completion::new(0, Err(Error::Cancelled)));
            }
        }
    }
}

impl Drop for ThreadedChannel {
    fn drop(&mut self) {
        self.close()
    }
}

impl fmt::Debug for ThreadedChannel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ThreadedChannel")
            .field("conf", &self.conf)
            .field("running", &self.thread.is_some())
            .finish()
    }
}

//------------ Command -------------------------------------------------------

/// An operation to be performed by the background thread.
enum Command {
    Submit {
        id: QueryId,
        host: String,
        service: Option<String>,
        hints: AddrInfoHints,
        continuation: Continuation,
    },
    Cancel(QueryId, oneshot::Sender<bool>),
    Close,
}

//------------ run -----------------------------------------------------------

/// Drives a channel until it is closed.
async fn run<T: Transport>(
    mut channel: Channel<T>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    debug!("resolver thread started");
    loop {
        let command = if channel.is_idle() {
            commands.recv().await
        } else {
            tokio::select! {
                command = commands.recv() => command,
                _ = channel.poll_once(Duration::MAX) => continue,
            }
        };
        match command {
            Some(Command::Submit {
                id,
                host,
                service,
                hints,
                continuation,
            }) => channel.submit_with_id(
                id,
                &host,
                service.as_deref(),
                &hints,
                continuation,
            ),
            Some(Command::Cancel(id, reply)) => {
                let _ = reply.send(channel.cancel(id));
            }
            Some(Command::Close) | None => break,
        }
    }
    channel.close();
    debug!("resolver thread finished");
}
