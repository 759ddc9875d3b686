//! End-to-end session tests against an in-process server.
//!
//! The server speaks the real wire protocol: it sends the registry hash,
//! serves the id maps unless the client has them cached, then answers
//! `send_system_chat`, `set_block` and `get_block` commands.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use codecraft::codec::Vec3i;
use codecraft::protocol::{CmdOutcome, CmdResultMsg};
use codecraft::{
    Block, ByteBuf, Client, ClientState, CmdUid, DynamicValue, Error, Nbt, NbtCompound, PushMsg,
    RegistryIdMaps, ResourceId, SendSystemChatCmd, SetBlockOptions, World,
};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{Instant, sleep};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Server
// ============================================================================

const HASH: &[u8] = &[0xc0, 0xde, 0x42];

/// Set `RUST_LOG=codecraft=debug` to see client logs.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn id(s: &str) -> ResourceId {
    ResourceId::parse(s).unwrap()
}

fn server_maps() -> RegistryIdMaps {
    let mut maps = RegistryIdMaps::new();
    maps.cmd_mut().put(0, id("codecraft:send_system_chat")).unwrap();
    maps.cmd_mut().put(1, id("codecraft:set_block")).unwrap();
    maps.cmd_mut().put(2, id("codecraft:get_block")).unwrap();
    maps.msg_mut().put(0, id("codecraft:cmd_result")).unwrap();
    maps.msg_mut().put(1, id("codecraft:tick")).unwrap();
    maps.block_mut().put(0, id("air")).unwrap();
    maps.block_mut().put(1, id("stone")).unwrap();
    maps.world_mut().put(0, id("overworld")).unwrap();
    maps.freeze();
    maps
}

/// Block entity data the server reports for any non-air block.
fn block_entity() -> Nbt {
    Nbt::Compound(NbtCompound::from([("placed".to_string(), Nbt::Byte(1))]))
}

#[derive(Default)]
struct Log {
    cached: Vec<bool>,
    chat: Vec<String>,
    blocks: Vec<(Vec3i, ResourceId)>,
}

struct Server {
    addr: SocketAddr,
    log: Arc<Mutex<Log>>,
}

impl Server {
    async fn start() -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let log = Arc::new(Mutex::new(Log::default()));
        let maps = Arc::new(server_maps());

        let shared = Arc::clone(&log);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let log = Arc::clone(&shared);
                let maps = Arc::clone(&maps);
                tokio::spawn(async move {
                    let _ = serve(stream, &maps, &log).await;
                });
            }
        });

        Self { addr, log }
    }

    fn uri(&self) -> String {
        format!("ws://{}", self.addr)
    }

    fn client(&self, cache: &TempDir) -> Client {
        Client::builder()
            .uri(self.uri())
            .name("session-test")
            .cache_dir(cache.path())
            .push_msg(id("codecraft:tick"))
            .build()
            .unwrap()
    }
}

async fn send(ws: &mut WebSocketStream<TcpStream>, buf: ByteBuf) -> anyhow::Result<()> {
    ws.send(Message::Binary(buf.into_inner().into())).await?;
    Ok(())
}

async fn recv(ws: &mut WebSocketStream<TcpStream>) -> anyhow::Result<Option<Vec<u8>>> {
    while let Some(message) = ws.next().await {
        match message? {
            Message::Binary(data) => return Ok(Some(data.to_vec())),
            Message::Close(_) => return Ok(None),
            _ => {}
        }
    }
    Ok(None)
}

async fn recv_bool(ws: &mut WebSocketStream<TcpStream>) -> anyhow::Result<bool> {
    let frame = recv(ws).await?.context("closed during handshake")?;
    Ok(ByteBuf::view(&frame).read_bool()?)
}

async fn serve(stream: TcpStream, maps: &RegistryIdMaps, log: &Mutex<Log>) -> anyhow::Result<()> {
    let mut ws = accept_async(stream).await?;

    let mut hash = ByteBuf::new();
    hash.write_blob(HASH);
    send(&mut ws, hash).await?;

    let cached = recv_bool(&mut ws).await?;
    log.lock().cached.push(cached);
    if !cached {
        let mut sync = ByteBuf::new();
        maps.write_sync_packets(&mut sync);
        send(&mut ws, sync).await?;
    }
    if !recv_bool(&mut ws).await? {
        bail!("client was not ready");
    }

    while let Some(frame) = recv(&mut ws).await? {
        let mut reply = ByteBuf::new();
        let mut buf = ByteBuf::view(&frame);

        while buf.has_remaining() {
            let kind = buf.read_id_mapped(maps.cmd())?;
            let uid = CmdUid::new(u32::try_from(buf.read_varint()?)?);

            let values = match kind.path() {
                "send_system_chat" => {
                    let text = buf.read_string()?;
                    log.lock().chat.push(text.clone());
                    match text.as_str() {
                        "silent" => continue,
                        "garbage" => {
                            reply.write_varint(99);
                            continue;
                        }
                        "fail" => {
                            CmdResultMsg {
                                uid,
                                outcome: CmdOutcome::Failure("boom".to_string()),
                            }
                            .write(&mut reply, maps)?;
                            continue;
                        }
                        "push" => {
                            reply.write_id_mapped(maps.msg(), &id("codecraft:tick"))?;
                            reply.write_dynamic_tuple(&[DynamicValue::VarInt(7)], maps)?;
                        }
                        _ => {}
                    }
                    Vec::new()
                }
                "set_block" => {
                    buf.read_id_mapped(maps.world())?;
                    let pos = buf.read_vec3i()?;
                    let flags = buf.read_u8()?;
                    let block = if flags & 1 != 0 {
                        buf.read_block_state(maps)?.id().clone()
                    } else {
                        buf.read_id_mapped(maps.block())?
                    };
                    log.lock().blocks.push((pos, block));
                    vec![DynamicValue::Bool(true)]
                }
                "get_block" => {
                    buf.read_id_mapped(maps.world())?;
                    let pos = buf.read_vec3i()?;
                    let with_nbt = buf.read_bool()?;
                    let block = log
                        .lock()
                        .blocks
                        .iter()
                        .rev()
                        .find(|(at, _)| *at == pos)
                        .map_or_else(|| id("air"), |(_, block)| block.clone());

                    let has_entity = block != id("air");
                    let mut values = vec![DynamicValue::BlockState(Block::new(block))];
                    if with_nbt {
                        values.push(DynamicValue::Bool(has_entity));
                        if has_entity {
                            values.push(DynamicValue::Nbt(Some(block_entity())));
                        }
                    }
                    values
                }
                other => bail!("unexpected command {other}"),
            };

            let mut payload = ByteBuf::new();
            payload.write_dynamic_tuple(&values, maps)?;
            CmdResultMsg {
                uid,
                outcome: CmdOutcome::Success(payload.into_inner()),
            }
            .write(&mut reply, maps)?;
        }

        if !reply.is_empty() {
            send(&mut ws, reply).await?;
        }
    }
    Ok(())
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        sleep(Duration::from_millis(10)).await;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_establish_and_run_commands() {
    let server = Server::start().await;
    let cache = TempDir::new().unwrap();
    let client = server.client(&cache);

    client.establish().await.unwrap();
    assert_eq!(client.state(), ClientState::Established);
    let maps = client.reg_id_maps().unwrap();
    assert!(maps.is_frozen());
    assert_eq!(maps.cmd().id_of(&id("codecraft:set_block")), Some(1));

    client.run_cmd(SendSystemChatCmd::new("hello")).await.unwrap();

    let changed = World::overworld()
        .set_block(
            &client,
            Vec3i::new(4, 64, -2),
            Block::new(id("stone")),
            SetBlockOptions::default(),
        )
        .await
        .unwrap();
    assert!(changed);

    let log = server.log.lock();
    assert_eq!(log.cached, vec![false]);
    assert_eq!(log.chat, vec!["hello".to_string()]);
    assert_eq!(log.blocks, vec![(Vec3i::new(4, 64, -2), id("stone"))]);
    drop(log);

    client.close().await.unwrap();
    assert_eq!(client.state(), ClientState::Closed);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_get_block_reads_back_placed_block() {
    let server = Server::start().await;
    let cache = TempDir::new().unwrap();
    let client = server.client(&cache);
    client.establish().await.unwrap();

    let world = World::overworld();
    let pos = Vec3i::new(1, 65, 1);

    let (block, nbt) = world.get_block(&client, pos, true).await.unwrap();
    assert_eq!(block.id(), &id("air"));
    assert_eq!(nbt, None);

    world
        .set_block(&client, pos, Block::new(id("stone")), SetBlockOptions::default())
        .await
        .unwrap();

    let (block, nbt) = world.get_block(&client, pos, true).await.unwrap();
    assert_eq!(block.id(), &id("stone"));
    assert_eq!(nbt, Some(block_entity()));

    let (block, nbt) = world.get_block(&client, pos, false).await.unwrap();
    assert_eq!(block.id(), &id("stone"));
    assert_eq!(nbt, None);

    client.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_command_failure_keeps_session() {
    let server = Server::start().await;
    let cache = TempDir::new().unwrap();
    let client = server.client(&cache);
    client.establish().await.unwrap();

    let err = client
        .run_cmd(SendSystemChatCmd::new("fail"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cmd { ref message } if message == "boom"));

    client.run_cmd(SendSystemChatCmd::new("still here")).await.unwrap();
    assert_eq!(client.pending_count(), 0);
    client.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cached_reconnect_skips_sync() {
    let server = Server::start().await;
    let cache = TempDir::new().unwrap();

    let first = server.client(&cache);
    first.establish().await.unwrap();
    first.close().await.unwrap();
    assert!(cache.path().join("C0DE42.json").is_file());

    let second = server.client(&cache);
    second.establish().await.unwrap();
    assert_eq!(
        second.reg_id_maps().unwrap().world().id_of(&id("overworld")),
        Some(0)
    );
    second.run_cmd(SendSystemChatCmd::new("cached")).await.unwrap();
    second.close().await.unwrap();

    assert_eq!(server.log.lock().cached, vec![false, true]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_batch_is_one_frame() {
    let server = Server::start().await;
    let cache = TempDir::new().unwrap();
    let client = server.client(&cache);
    client.establish().await.unwrap();

    let mut batch = client.batch().unwrap();
    let waiters: Vec<_> = ["a", "b", "c"]
        .into_iter()
        .map(|text| batch.run_cmd(SendSystemChatCmd::new(text)).unwrap())
        .collect();
    batch.flush().await.unwrap();
    for waiter in waiters {
        waiter.await.unwrap();
    }

    assert_eq!(server.log.lock().chat, vec!["a", "b", "c"]);
    client.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_push_messages_reach_handler() {
    let server = Server::start().await;
    let cache = TempDir::new().unwrap();
    let client = server.client(&cache);
    client.establish().await.unwrap();

    let seen: Arc<Mutex<Vec<PushMsg>>> = Arc::default();
    let sink = Arc::clone(&seen);
    client.set_msg_handler(move |msg| sink.lock().push(msg));

    client.run_cmd(SendSystemChatCmd::new("push")).await.unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].kind, id("codecraft:tick"));
    assert_eq!(seen[0].values, vec![DynamicValue::VarInt(7)]);
    drop(seen);

    client.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_close_fails_pending_commands() {
    let server = Server::start().await;
    let cache = TempDir::new().unwrap();
    let client = server.client(&cache);
    client.establish().await.unwrap();

    let runner = client.clone();
    let pending =
        tokio::spawn(async move { runner.run_cmd(SendSystemChatCmd::new("silent")).await });
    wait_until(|| server.log.lock().chat.len() == 1).await;

    client.close().await.unwrap();
    let err = pending.await.unwrap().unwrap_err();
    assert!(err.is_cancelled() || matches!(err, Error::ConnectionClosed), "{err}");
    assert_eq!(client.pending_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_command_timeout() {
    let server = Server::start().await;
    let cache = TempDir::new().unwrap();
    let client = Client::builder()
        .uri(server.uri())
        .cache_dir(cache.path())
        .command_timeout(Duration::from_millis(200))
        .build()
        .unwrap();
    client.establish().await.unwrap();

    let err = client
        .run_cmd(SendSystemChatCmd::new("silent"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled { .. }), "{err}");
    client.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_bad_frame_closes_session() {
    let server = Server::start().await;
    let cache = TempDir::new().unwrap();
    let client = server.client(&cache);
    client.establish().await.unwrap();

    let err = client
        .run_cmd(SendSystemChatCmd::new("garbage"))
        .await
        .unwrap_err();
    assert!(err.is_cancelled(), "{err}");

    wait_until(|| client.state() == ClientState::Closed).await;
    assert!(client.run_cmd(SendSystemChatCmd::new("x")).await.is_err());
    assert!(client.close().await.is_ok());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_blocking_facade_and_concurrent_close() {
    let server = Server::start().await;
    let cache = TempDir::new().unwrap();
    let client = server.client(&cache);

    let blocking = client.clone();
    tokio::task::spawn_blocking(move || {
        blocking.establish().wait()?;
        blocking.run_cmd_blocking(SendSystemChatCmd::new("sync"))?;
        World::default().set_block_blocking(
            &blocking,
            Vec3i::new(0, 0, 0),
            Block::new(id("air")),
            SetBlockOptions {
                set_state: false,
                ..SetBlockOptions::default()
            },
        )
    })
    .await
    .unwrap()
    .unwrap();

    let reader = client.clone();
    let (block, _) = tokio::task::spawn_blocking(move || {
        World::default().get_block_blocking(&reader, Vec3i::new(0, 0, 0), false)
    })
    .await
    .unwrap()
    .unwrap();
    assert_eq!(block.id(), &id("air"));

    let closers: Vec<_> = (0..4)
        .map(|_| {
            let client = client.clone();
            tokio::task::spawn_blocking(move || client.close().wait())
        })
        .collect();
    for closer in closers {
        closer.await.unwrap().unwrap();
    }

    assert_eq!(client.state(), ClientState::Closed);
    assert_eq!(server.log.lock().blocks, vec![(Vec3i::new(0, 0, 0), id("air"))]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unreachable_server_fails_establish() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = Client::builder()
        .uri(format!("ws://{addr}"))
        .no_cache()
        .build()
        .unwrap();
    let err = client.establish().await.unwrap_err();
    assert!(err.is_network_error(), "{err}");
    assert!(err.to_string().contains(&addr.to_string()));
    assert_eq!(client.state(), ClientState::Failed);
    client.close().await.unwrap();
}
