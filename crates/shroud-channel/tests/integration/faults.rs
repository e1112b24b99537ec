//! Fault injection: corruption, oversize frames, and broken peers.

use shroud_channel::{ChannelConfig, ChannelError, Endpoint, EndpointBuilder, Role};

use crate::{pair, pair_with, CorruptingTransformer, DUPLEX_CAPACITY};

/// A chunk whose body is altered after hashing surfaces on the sender as
/// "Remote error: Invalid chunk hash: …" and on the receiver as a hash
/// mismatch.
#[tokio::test]
async fn corrupted_chunk_reports_a_remote_error() -> anyhow::Result<()> {
    let (client_stream, server_stream) = tokio::io::duplex(DUPLEX_CAPACITY);

    let mut client = Endpoint::new(client_stream, Role::Client, ChannelConfig::default());
    // The corrupting hook runs after decryption, before the stream layer —
    // exactly where undetected wire tampering would land.
    let mut server = EndpointBuilder::new(Role::Server)
        .data_transformer(CorruptingTransformer { threshold: 100 })
        .build(server_stream);

    let payload = vec![0x3Cu8; 512];
    let mut payload_reader = payload.as_slice();
    let mut sink = Vec::new();

    let (sent, received) = tokio::join!(
        client.send_stream(&mut payload_reader, None, Some(512)),
        server.recv_stream(&mut sink),
    );

    let sender_err = sent.unwrap_err();
    assert!(
        sender_err
            .to_string()
            .starts_with("Remote error: Invalid chunk hash: "),
        "got: {sender_err}"
    );
    assert!(matches!(
        received.unwrap_err(),
        ChannelError::HashMismatch { .. }
    ));
    Ok(())
}

/// A chunk declaring more bytes than the package cap draws the
/// "Chunk is too big!" ACK.
#[tokio::test]
async fn oversize_chunk_declaration_is_nacked() -> anyhow::Result<()> {
    let (mut client, mut server) = pair(ChannelConfig::default());

    let cap = client.config().max_package_size;
    let mut sink = Vec::new();

    let client_side = async {
        // Hand-crafted envelope: a length beyond the cap and nothing else.
        let envelope = (cap + 1).to_le_bytes();
        client.write(&envelope).await?;

        let ack = client.read().await?.unwrap();
        assert_eq!(ack, b"Chunk is too big!");
        anyhow::Ok(())
    };
    let server_side = async {
        let err = server.recv_stream(&mut sink).await.unwrap_err();
        assert!(matches!(err, ChannelError::FrameTooLarge { .. }));
        anyhow::Ok(())
    };

    let (c, s) = tokio::join!(client_side, server_side);
    c?;
    s?;
    Ok(())
}

/// A chunk envelope that declares more body bytes than it carries is a
/// protocol violation, distinct from a hash failure.
#[tokio::test]
async fn truncated_chunk_envelope_is_a_protocol_violation() -> anyhow::Result<()> {
    let (mut client, mut server) = pair(ChannelConfig::default());

    let mut sink = Vec::new();
    let client_side = async {
        // Declares eight body bytes but carries three.
        let mut envelope = 8u32.to_le_bytes().to_vec();
        envelope.extend_from_slice(&[0u8; 32]);
        envelope.extend_from_slice(&[0xEE; 3]);
        client.write(&envelope).await?;
        anyhow::Ok(())
    };
    let server_side = async {
        let err = server.recv_stream(&mut sink).await.unwrap_err();
        assert!(matches!(err, ChannelError::Protocol(_)), "got: {err}");
        anyhow::Ok(())
    };

    let (c, s) = tokio::join!(client_side, server_side);
    c?;
    s?;
    Ok(())
}

/// An inbound frame above the cap yields the `None` size-limit signal
/// once, then the endpoint refuses further I/O.
#[tokio::test]
async fn inbound_oversize_frame_breaks_the_receiver() -> anyhow::Result<()> {
    let mut server_config = ChannelConfig::default();
    server_config.max_package_size = 1024;
    let mut client_config = ChannelConfig::default();
    client_config.compress = Some(false);

    let (mut client, mut server) = pair_with(client_config, server_config);

    let client_side = async {
        let sent = client.write(&vec![0x77u8; 4000]).await?;
        assert_eq!(sent, Some(4000));
        anyhow::Ok(())
    };
    let server_side = async {
        assert!(server.read().await?.is_none());
        anyhow::Ok(())
    };

    let (c, s) = tokio::join!(client_side, server_side);
    c?;
    s?;

    assert!(matches!(
        server.read().await.unwrap_err(),
        ChannelError::Broken
    ));
    Ok(())
}

/// A peer that disappears before the handshake leaves the server with an
/// unexpected EOF, and the endpoint latches broken.
#[tokio::test]
async fn peer_vanishing_before_the_handshake_is_an_eof() {
    let (client_stream, server_stream) = tokio::io::duplex(1024);
    drop(client_stream);

    let mut server = Endpoint::new(server_stream, Role::Server, ChannelConfig::default());
    assert!(matches!(
        server.read().await.unwrap_err(),
        ChannelError::UnexpectedEof
    ));
    assert!(matches!(
        server.read().await.unwrap_err(),
        ChannelError::Broken
    ));
}

/// A peer that disappears after keying surfaces an EOF on the next read.
#[tokio::test]
async fn peer_vanishing_after_keying_is_an_eof() -> anyhow::Result<()> {
    let (mut client, mut server) = pair(ChannelConfig::default());

    let (c, s) = tokio::join!(client.ensure_keyed(), server.ensure_keyed());
    c?;
    s?;
    drop(client);

    assert!(matches!(
        server.read().await.unwrap_err(),
        ChannelError::UnexpectedEof
    ));
    Ok(())
}
