use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use malstack_message::Message;
use malstack_transport::{
    Endpoint, FrameConfig, FrameReader, GenericTransport, InboundDispatcher, SocketStream,
    TransportError, UdsListener,
};
use tracing::{debug, info, warn};

use crate::cmd::ListenArgs;
use crate::exit::{encoding_error, io_error, transport_error, CliError, CliResult, SUCCESS};
use crate::output::{print_message, MessageSummary, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.transport.resolve()?;
    let factory = config.stream_factory().map_err(encoding_error)?;
    let frame_config = config.frame_config();

    let transport = GenericTransport::new(format!("maluds://{}", args.path.display()), config)
        .map_err(|err| transport_error("transport setup failed", err))?;
    let endpoint = transport
        .create_endpoint(&args.endpoint)
        .map_err(|err| transport_error("endpoint setup failed", err))?;

    let (tx, rx) = mpsc::channel::<Message>();
    let tx = Mutex::new(tx);
    endpoint.set_listener(Arc::new(move |_: &Endpoint, message: Message| {
        if let Ok(tx) = tx.lock() {
            let _ = tx.send(message);
        }
    }));
    endpoint.start();

    let listener =
        UdsListener::bind(&args.path).map_err(|err| transport_error("bind failed", err))?;
    listener
        .set_nonblocking(true)
        .map_err(|err| transport_error("bind failed", err))?;
    info!(uri = %endpoint.uri(), "endpoint listening");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok(stream) => spawn_reader(stream, transport.dispatcher(), frame_config.clone())?,
            Err(TransportError::Accept(err)) if err.kind() == ErrorKind::WouldBlock => {}
            Err(err) => return Err(transport_error("accept failed", err)),
        }

        let first = match rx.recv_timeout(POLL_INTERVAL) {
            Ok(message) => message,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        for message in std::iter::once(first).chain(rx.try_iter()) {
            print_message(&MessageSummary::new(&message, &factory), format);
            printed = printed.saturating_add(1);
            if args.count.is_some_and(|count| printed >= count) {
                return Ok(SUCCESS);
            }
        }
    }

    Ok(SUCCESS)
}

fn spawn_reader(
    stream: SocketStream,
    dispatcher: InboundDispatcher,
    config: FrameConfig,
) -> CliResult<()> {
    stream
        .set_nonblocking(false)
        .map_err(|err| transport_error("accept failed", err))?;
    if let Some((uid, gid, pid)) = stream.peer_credentials() {
        debug!(uid, gid, pid, "peer connected");
    }
    let reader = FrameReader::with_config_socket(stream, config)
        .map_err(|err| transport_error("accept failed", err))?;

    std::thread::Builder::new()
        .name("malstack-reader".into())
        .spawn(move || match dispatcher.serve(reader) {
            Ok(frames) => debug!(frames, "peer disconnected"),
            Err(err) => warn!(error = %err, "inbound stream failed"),
        })
        .map_err(|err| io_error("reader thread failed", err))?;
    Ok(())
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
