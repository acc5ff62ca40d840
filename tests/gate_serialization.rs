//! S4: two clients racing against one slow device never interleave on the
//! upstream connection; request/reply pairs arrive whole, in turn.

use std::time::Duration;

use modbus_proxy_core::config::{DeviceConfig, ListenConfig, ModbusConfig, SerialParams};
use modbus_proxy_core::core::bridge::Bridge;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const REQUEST: &[u8] = &[0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x11, 0x03, 0x00, 0x00, 0x00, 0x0A];
const REPLY: &[u8] = &[0x00, 0x01, 0x00, 0x00, 0x00, 0x03, 0x11, 0x03, 0x00];

#[tokio::test]
async fn two_concurrent_clients_never_interleave_on_the_wire() {
    let device_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let device_port = device_listener.local_addr().unwrap().port();

    let device_task = tokio::spawn(async move {
        let (mut stream, _) = device_listener.accept().await.unwrap();
        for _ in 0..2 {
            let mut buf = vec![0u8; REQUEST.len()];
            stream.read_exact(&mut buf).await.unwrap();
            assert_eq!(buf, REQUEST, "a partial/interleaved write would corrupt this frame");
            tokio::time::sleep(Duration::from_millis(50)).await;
            stream.write_all(REPLY).await.unwrap();
        }
    });

    let device = DeviceConfig {
        modbus: ModbusConfig {
            url: format!("tcp://127.0.0.1:{device_port}"),
            timeout: 2.0,
            connection_time: 0.0,
            serial: SerialParams::default(),
        },
        listen: ListenConfig { bind: "127.0.0.1:0".into() },
        unit_id_remapping: Default::default(),
    };

    let bridge = Bridge::new(&device).unwrap();
    let handle = bridge.start().await.unwrap();
    let addr = handle.listen_addr();

    let client = |addr| async move {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(REQUEST).await.unwrap();
        let mut got = vec![0u8; REPLY.len()];
        tokio::time::timeout(Duration::from_secs(2), stream.read_exact(&mut got))
            .await
            .unwrap()
            .unwrap();
        got
    };

    let (a, b) = tokio::join!(client(addr), client(addr));
    assert_eq!(a, REPLY);
    assert_eq!(b, REPLY);

    device_task.await.unwrap();
    handle.stop().await;
}
