fn main() {
    println!("Run `cargo test -p session-flows` to execute the end-to-end session scenarios.");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tandem_protocol::{Frame, Opcode, apply_mask, read_frame};
    use tandem_relay::handshake;
    use tandem_relay::{RelayServer, ServerConfig};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpStream;
    use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
    use tokio::task::JoinHandle;

    const CLIENT_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";
    const MASK: [u8; 4] = [0x11, 0xE2, 0x03, 0x7F];

    /// Starts a relay on an OS-assigned port.
    async fn start_relay() -> (Arc<RelayServer>, u16, JoinHandle<()>) {
        let server = RelayServer::new(ServerConfig {
            port: 0,
            ..ServerConfig::default()
        });
        let runner = Arc::clone(&server);
        let handle = tokio::spawn(async move {
            runner.run().await.unwrap();
        });

        let mut port = 0;
        for _ in 0..100 {
            port = server.port().await;
            if port != 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_ne!(port, 0, "server never bound");
        (server, port, handle)
    }

    /// Encodes a frame the way a client does: masked.
    fn client_encode(frame: &Frame) -> Vec<u8> {
        let mut masked = frame.payload.clone();
        apply_mask(&mut masked, MASK);

        let mut buf = Vec::with_capacity(14 + masked.len());
        buf.push(u8::from(frame.fin) << 7 | frame.opcode as u8);
        match masked.len() {
            len if len <= 125 => buf.push(0x80 | len as u8),
            len if len <= 65535 => {
                buf.push(0x80 | 126);
                buf.extend_from_slice(&(len as u16).to_be_bytes());
            }
            len => {
                buf.push(0x80 | 127);
                buf.extend_from_slice(&(len as u64).to_be_bytes());
            }
        }
        buf.extend_from_slice(&MASK);
        buf.extend_from_slice(&masked);
        buf
    }

    /// A minimal relay client: does the upgrade, then speaks masked
    /// frames.
    struct Client {
        reader: BufReader<OwnedReadHalf>,
        writer: OwnedWriteHalf,
    }

    impl Client {
        async fn connect(port: u16) -> Self {
            let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
            let (read_half, write_half) = stream.into_split();
            let mut client = Self {
                reader: BufReader::new(read_half),
                writer: write_half,
            };
            client.upgrade().await;
            client
        }

        async fn upgrade(&mut self) {
            let request = format!(
                "GET /chat HTTP/1.1\r\n\
                 Host: 127.0.0.1\r\n\
                 Upgrade: websocket\r\n\
                 Connection: Upgrade\r\n\
                 Sec-WebSocket-Key: {CLIENT_KEY}\r\n\
                 Sec-WebSocket-Version: 13\r\n\r\n"
            );
            self.writer.write_all(request.as_bytes()).await.unwrap();

            let mut status = String::new();
            self.reader.read_line(&mut status).await.unwrap();
            assert!(
                status.contains("101 Switching Protocols"),
                "unexpected status line: {status:?}"
            );

            let mut accept = None;
            loop {
                let mut line = String::new();
                self.reader.read_line(&mut line).await.unwrap();
                let line = line.trim_end();
                if line.is_empty() {
                    break;
                }
                if let Some(value) = line.strip_prefix("Sec-WebSocket-Accept: ") {
                    accept = Some(value.to_string());
                }
            }
            assert_eq!(
                accept.as_deref(),
                Some(handshake::accept_key(CLIENT_KEY).as_str()),
                "accept key must match the derivation"
            );
        }

        async fn send(&mut self, frame: &Frame) {
            self.writer.write_all(&client_encode(frame)).await.unwrap();
        }

        async fn send_text(&mut self, text: &str) {
            self.send(&Frame::text(text)).await;
        }

        async fn recv(&mut self) -> Frame {
            read_frame(&mut self.reader).await.unwrap()
        }

        async fn recv_text(&mut self) -> String {
            let frame = self.recv().await;
            assert!(frame.is_text(), "expected a text frame, got {frame:?}");
            String::from_utf8(frame.payload).unwrap()
        }

        /// Registers under `name` and returns the auto-assigned room id.
        async fn register(&mut self, name: &str, id: &str) -> String {
            self.send_text(&format!("NAME {name} {id}")).await;
            let notice = self.recv_text().await;
            notice
                .strip_prefix("ROOM ")
                .expect("ROOM notice after NAME")
                .to_string()
        }
    }

    /// Scenario: register, join, exchange a greeting.
    #[tokio::test]
    async fn name_room_peer_and_relay() {
        let (server, port, handle) = start_relay().await;

        let mut alice = Client::connect(port).await;
        let room = alice.register("alice", "0001").await;

        let mut bob = Client::connect(port).await;
        let bob_room = bob.register("bob", "0002").await;
        assert_ne!(room, bob_room, "auto-assigned rooms must differ");

        bob.send_text(&format!("ROOM {room}")).await;
        assert_eq!(bob.recv_text().await, format!("ROOM {room}"));
        assert_eq!(alice.recv_text().await, "PEER bob");
        assert_eq!(bob.recv_text().await, "PEER alice");

        alice.send_text("hello").await;
        assert_eq!(bob.recv_text().await, "hello");

        server.shutdown();
        handle.await.unwrap();
    }

    /// Scenario: a fragmented message arrives frame-by-frame and never
    /// interleaves with the destination's own traffic.
    #[tokio::test]
    async fn fragmented_relay_is_uninterleaved() {
        let (server, port, handle) = start_relay().await;

        let mut alice = Client::connect(port).await;
        let room = alice.register("alice", "0001").await;
        let mut bob = Client::connect(port).await;
        bob.send_text(&format!("ROOM {room}")).await;
        bob.recv_text().await;
        alice.recv_text().await;
        bob.recv_text().await;

        let parts = [
            Frame {
                fin: false,
                opcode: Opcode::Text,
                payload: b"one ".to_vec(),
            },
            Frame {
                fin: false,
                opcode: Opcode::Continuation,
                payload: b"two ".to_vec(),
            },
            Frame {
                fin: true,
                opcode: Opcode::Continuation,
                payload: b"three".to_vec(),
            },
        ];

        // First fragment goes out; once Bob has it his wire is busy.
        alice.send(&parts[0]).await;
        let first = bob.recv().await;
        assert!(!first.fin);
        assert_eq!(first.payload, b"one ");

        // Bob pings mid-message: the PONG has to queue behind Alice's
        // unfinished message. Bob also talks to Alice concurrently.
        bob.send_text("PING").await;
        bob.send_text("from bob").await;
        assert_eq!(alice.recv_text().await, "from bob");

        alice.send(&parts[1]).await;
        alice.send(&parts[2]).await;

        let mut text = first.payload.clone();
        for expected_fin in [false, true] {
            let frame = bob.recv().await;
            assert_eq!(frame.fin, expected_fin);
            text.extend_from_slice(&frame.payload);
        }
        assert_eq!(text, b"one two three");
        assert_eq!(
            bob.recv_text().await,
            "PONG",
            "queued reply must drain only after the message completes"
        );

        server.shutdown();
        handle.await.unwrap();
    }

    /// Scenario: a vanishing peer is reported with POUT.
    #[tokio::test]
    async fn disconnect_notifies_roommate() {
        let (server, port, handle) = start_relay().await;

        let mut alice = Client::connect(port).await;
        let room = alice.register("alice", "0001").await;
        let mut bob = Client::connect(port).await;
        bob.send_text(&format!("ROOM {room}")).await;
        bob.recv_text().await;
        alice.recv_text().await;
        bob.recv_text().await;

        drop(alice);
        assert_eq!(bob.recv_text().await, "POUT alice");

        server.shutdown();
        handle.await.unwrap();
    }

    /// Scenario: a third guest knocking on a full room is reseated into
    /// a fresh one, never errored.
    #[tokio::test]
    async fn full_room_reseats_the_third_guest() {
        let (server, port, handle) = start_relay().await;

        let mut alice = Client::connect(port).await;
        let room = alice.register("alice", "0001").await;
        let mut bob = Client::connect(port).await;
        bob.send_text(&format!("ROOM {room}")).await;
        bob.recv_text().await;
        alice.recv_text().await;
        bob.recv_text().await;

        let mut carol = Client::connect(port).await;
        carol.send_text(&format!("ROOM {room}")).await;
        let notice = carol.recv_text().await;
        let new_room = notice.strip_prefix("ROOM ").expect("ROOM notice");
        assert_ne!(new_room, room, "the full room must not be joined");

        server.shutdown();
        handle.await.unwrap();
    }

    /// Scenario: a close frame ends the session; the server answers in
    /// kind before the socket goes away.
    #[tokio::test]
    async fn close_frame_round_trip() {
        let (server, port, handle) = start_relay().await;

        let mut alice = Client::connect(port).await;
        alice.register("alice", "0001").await;

        alice.send(&Frame::close()).await;
        let reply = alice.recv().await;
        assert!(reply.is_close());
        assert_eq!(reply.payload, b"CLOSE");

        server.shutdown();
        handle.await.unwrap();
    }

    /// Scenario: binary file parts announce their filename first.
    #[tokio::test]
    async fn file_part_announced_with_pend() {
        let (server, port, handle) = start_relay().await;

        let mut alice = Client::connect(port).await;
        let room = alice.register("alice", "0001").await;
        let mut bob = Client::connect(port).await;
        bob.send_text(&format!("ROOM {room}")).await;
        bob.recv_text().await;
        alice.recv_text().await;
        bob.recv_text().await;

        alice
            .send(&Frame::file_part("notes.txt", &[0xDE, 0xAD, 0xBE, 0xEF], true))
            .await;

        assert_eq!(bob.recv_text().await, "PEND notes.txt");
        let part = bob.recv().await;
        assert!(part.is_binary());
        assert_eq!(part.filename().unwrap(), b"notes.txt");

        server.shutdown();
        handle.await.unwrap();
    }

    /// Scenario: text keepalives are answered in band.
    #[tokio::test]
    async fn ping_pong() {
        let (server, port, handle) = start_relay().await;

        let mut client = Client::connect(port).await;
        client.send_text("PING").await;
        assert_eq!(client.recv_text().await, "PONG");

        server.shutdown();
        handle.await.unwrap();
    }

    /// Scenario: clipboard messages relay like ordinary traffic.
    #[tokio::test]
    async fn clip_relays_to_peer() {
        let (server, port, handle) = start_relay().await;

        let mut alice = Client::connect(port).await;
        let room = alice.register("alice", "0001").await;
        let mut bob = Client::connect(port).await;
        bob.send_text(&format!("ROOM {room}")).await;
        bob.recv_text().await;
        alice.recv_text().await;
        bob.recv_text().await;

        alice.send_text("CLIP copied text").await;
        assert_eq!(bob.recv_text().await, "CLIP copied text");

        server.shutdown();
        handle.await.unwrap();
    }
}
