//! Demo port layer: a COBS-framed TCP port that drives an
//! [`engine::context::Context::new_com`] end to end.
//!
//! ThingSet has no single well-known port, so one framed TCP listener is
//! enough to exercise the dispatcher against real sockets. Production ports
//! (CAN, a real serial line) are a matter of swapping the framing and
//! transport below; the dispatcher and context never change.

use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    net::SocketAddr,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

use codec::{buffer::BufferPool, cobs};
use engine::{context::Context, dispatch, object::Database};

use crate::observer::EngineHandler;

/// The single port id this demo registers with its [`Context`].
pub const TCP_PORT_ID: u8 = 0;

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_millis() as u64
}

fn peer_uid(addr: &SocketAddr) -> u64 {
    let mut hasher = DefaultHasher::new();
    addr.hash(&mut hasher);
    hasher.finish()
}

/// Demo object tree: a `meas` group with a couple of readable
/// measurements and a zero-argument `reset` function, matching the
/// shape used throughout the engine crate's own dispatcher tests.
pub fn demo_database() -> Database {
    use engine::object::{access, Builder, Descriptor, ObjectType, Value};

    let db = Builder::new()
        .push(Descriptor {
            id: 0x70,
            name: "meas".into(),
            parent_id: 0,
            ty: ObjectType::Group,
            access_default: access::ANY,
            subsets_default: 0,
            callback: None,
        })
        .push(Descriptor {
            id: 0x71,
            name: "Bat_V".into(),
            parent_id: 0x70,
            ty: ObjectType::F32 { precision: 2 },
            access_default: access::READ_MASK,
            subsets_default: 0,
            callback: None,
        })
        .push(Descriptor {
            id: 0x72,
            name: "Bat_A".into(),
            parent_id: 0x70,
            ty: ObjectType::F32 { precision: 2 },
            access_default: access::READ_MASK,
            subsets_default: 0,
            callback: None,
        })
        .push(Descriptor {
            id: 0x80,
            name: "reset".into(),
            parent_id: 0,
            ty: ObjectType::Function,
            access_default: access::ANY,
            subsets_default: 0,
            callback: Some(Arc::new(|| log::info!("reset invoked"))),
        })
        .build(0)
        .expect("demo database has no duplicate ids");

    db.set_value(db.oref_by_id(0x71).expect("Bat_V present"), Value::F32(14.1));
    db.set_value(db.oref_by_id(0x72).expect("Bat_A present"), Value::F32(-0.6));
    db
}

/// Accept connections on `bind` forever, dispatching each frame against
/// `ctx` and writing the reply back out the same connection.
pub async fn run_tcp_port(
    bind: SocketAddr,
    ctx: Arc<Context>,
    pool: Arc<BufferPool>,
    handler: Arc<dyn EngineHandler>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind).await?;
    log::info!("thingset tcp port listening: addr={}", bind);

    loop {
        let (socket, addr) = listener.accept().await?;
        let ctx = ctx.clone();
        let pool = pool.clone();
        let handler = handler.clone();

        tokio::spawn(async move {
            handler.port_opened(TCP_PORT_ID, &addr.to_string());
            if let Err(e) = serve_connection(socket, addr, &ctx, &pool, &handler).await {
                log::warn!("tcp connection addr={} ended: {}", addr, e);
            }
            handler.port_closed(TCP_PORT_ID, &addr.to_string());
        });
    }
}

/// Read one COBS-delimited frame, blocking until a `0x00` sentinel or EOF.
/// Returns `Ok(None)` on a clean close.
async fn read_frame(socket: &mut TcpStream, raw: &mut Vec<u8>) -> anyhow::Result<Option<Vec<u8>>> {
    raw.clear();
    loop {
        let mut byte = [0u8; 1];
        if socket.read_exact(&mut byte).await.is_err() {
            return Ok(None);
        }
        if byte[0] == 0x00 {
            return Ok(Some(std::mem::take(raw)));
        }
        raw.push(byte[0]);
        if raw.len() > cobs::MAX_FRAME_LEN {
            anyhow::bail!("frame exceeds {} bytes without a delimiter", cobs::MAX_FRAME_LEN);
        }
    }
}

async fn serve_connection(
    mut socket: TcpStream,
    addr: SocketAddr,
    ctx: &Arc<Context>,
    pool: &Arc<BufferPool>,
    handler: &Arc<dyn EngineHandler>,
) -> anyhow::Result<()> {
    socket.set_nodelay(true)?;
    let uid = peer_uid(&addr);
    let mut raw = Vec::with_capacity(pool.data_size());

    while let Some(frame) = read_frame(&mut socket, &mut raw).await? {
        let mut decoded = vec![0u8; frame.len()];
        let n = cobs::decode(&frame, &mut decoded)?;
        decoded.truncate(n);

        let buf = pool.allocate(decoded.len(), codec::FOREVER)?;
        buf.push(&decoded)?;

        let outcome = dispatch::process(ctx, &buf, TCP_PORT_ID, uid, now_ms());
        handler.dispatched(TCP_PORT_ID, uid, outcome);

        match outcome {
            dispatch::Outcome::Responded | dispatch::Outcome::Forward { .. } => {
                let mut encoded = Vec::new();
                buf.with_payload(|payload| {
                    encoded = vec![0u8; payload.len() + 2];
                    let n = cobs::encode(payload, &mut encoded).expect("reply fits a COBS frame");
                    encoded.truncate(n);
                });
                socket.write_all(&encoded).await?;
            }
            dispatch::Outcome::Dropped => {}
        }
    }

    Ok(())
}

/// Build the demo database, a com context bound to [`TCP_PORT_ID`], and
/// run the TCP port until it errors out.
pub async fn run(config: Arc<crate::config::Config>, handler: Arc<dyn EngineHandler>) -> anyhow::Result<()> {
    let db = Arc::new(demo_database());
    let ctx = Arc::new(Context::new_com(config.core.locid, db, vec![TCP_PORT_ID], config.com.remote_count));
    let pool = BufferPool::new(config.com.buf_count, config.com.buf_data_size);

    run_tcp_port(config.com.listen, ctx, pool, handler).await
}
