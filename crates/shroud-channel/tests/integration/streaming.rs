//! Stream-layer transfers: chunking, ACK cadence, byte accounting, files.

use std::sync::atomic::Ordering;

use shroud_channel::{ChannelConfig, Endpoint, EndpointBuilder, Role};

use crate::{pair, CountingTransformer, DUPLEX_CAPACITY};

/// A 10,000-byte source with a 4,096-byte buffer crosses as exactly
/// three chunks plus one terminator, acknowledged three times.
#[tokio::test]
async fn ten_thousand_bytes_in_three_chunks() -> anyhow::Result<()> {
    let (client_stream, server_stream) = tokio::io::duplex(DUPLEX_CAPACITY);

    let (hook, transforms, restores) = CountingTransformer::new();
    let mut client = EndpointBuilder::new(Role::Client)
        .data_transformer(hook)
        .build(client_stream);
    let mut server = Endpoint::new(server_stream, Role::Server, ChannelConfig::default());

    let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    let mut payload_reader = payload.as_slice();
    let mut sink = Vec::new();

    let (sent, received) = tokio::join!(
        client.send_stream(&mut payload_reader, None, Some(4096)),
        server.recv_stream(&mut sink),
    );

    let sent = sent?;
    let received = received?;
    assert_eq!(sent, 10_000);
    assert_eq!(received, 10_000);
    assert_eq!(sink, payload);

    // Outbound datagrams: three chunk envelopes + one terminator.
    assert_eq!(transforms.load(Ordering::Relaxed), 4);
    // Inbound datagrams: one ACK per data chunk, none for the terminator.
    assert_eq!(restores.load(Ordering::Relaxed), 3);
    Ok(())
}

#[tokio::test]
async fn chunk_of_exactly_the_buffer_size_round_trips() -> anyhow::Result<()> {
    let (client_stream, server_stream) = tokio::io::duplex(DUPLEX_CAPACITY);

    let (hook, transforms, _) = CountingTransformer::new();
    let mut client = EndpointBuilder::new(Role::Client)
        .data_transformer(hook)
        .build(client_stream);
    let mut server = Endpoint::new(server_stream, Role::Server, ChannelConfig::default());

    let payload = vec![0xA5u8; 4096];
    let mut payload_reader = payload.as_slice();
    let mut sink = Vec::new();

    let (sent, received) = tokio::join!(
        client.send_stream(&mut payload_reader, None, Some(4096)),
        server.recv_stream(&mut sink),
    );

    assert_eq!(sent?, 4096);
    assert_eq!(received?, 4096);
    assert_eq!(sink, payload);

    // One full chunk, then the empty read that sends the terminator.
    assert_eq!(transforms.load(Ordering::Relaxed), 2);
    Ok(())
}

#[tokio::test]
async fn max_bytes_caps_the_transfer() -> anyhow::Result<()> {
    let (mut client, mut server) = pair(ChannelConfig::default());

    let payload: Vec<u8> = (0..10_240u32).map(|i| i as u8).collect();
    let mut payload_reader = payload.as_slice();
    let mut sink = Vec::new();

    let (sent, received) = tokio::join!(
        client.send_stream(&mut payload_reader, Some(3000), Some(1024)),
        server.recv_stream(&mut sink),
    );

    assert_eq!(sent?, 3000);
    assert_eq!(received?, 3000);
    assert_eq!(sink, &payload[..3000]);
    Ok(())
}

#[tokio::test]
async fn empty_source_sends_only_the_terminator() -> anyhow::Result<()> {
    let (mut client, mut server) = pair(ChannelConfig::default());

    let mut sink = Vec::new();
    let mut empty_reader: &[u8] = &[];
    let (sent, received) = tokio::join!(
        client.send_stream(&mut empty_reader, None, None),
        server.recv_stream(&mut sink),
    );

    assert_eq!(sent?, 0);
    assert_eq!(received?, 0);
    assert!(sink.is_empty());
    Ok(())
}

#[tokio::test]
async fn default_buffer_size_comes_from_the_config() -> anyhow::Result<()> {
    let mut config = ChannelConfig::default();
    config.read_buffer_size = 2000;
    let (client_stream, server_stream) = tokio::io::duplex(DUPLEX_CAPACITY);

    let (hook, transforms, _) = CountingTransformer::new();
    let mut client = EndpointBuilder::new(Role::Client)
        .config(config.clone())
        .data_transformer(hook)
        .build(client_stream);
    let mut server = Endpoint::new(server_stream, Role::Server, config);

    let payload = vec![0x11u8; 5000];
    let mut payload_reader = payload.as_slice();
    let mut sink = Vec::new();

    let (sent, received) = tokio::join!(
        client.send_stream(&mut payload_reader, None, None),
        server.recv_stream(&mut sink),
    );

    assert_eq!(sent?, 5000);
    assert_eq!(received?, 5000);
    // ceil(5000 / 2000) = 3 chunks, plus the terminator.
    assert_eq!(transforms.load(Ordering::Relaxed), 4);
    Ok(())
}

#[tokio::test]
async fn file_transfer_resolves_relative_paths_against_cwd() -> anyhow::Result<()> {
    let base = std::env::temp_dir().join(format!("shroud-file-test-{}", std::process::id()));
    let send_dir = base.join("outbox");
    let recv_dir = base.join("inbox");
    std::fs::create_dir_all(&send_dir)?;
    std::fs::create_dir_all(&recv_dir)?;

    let payload: Vec<u8> = (0..10_000u32).map(|i| (i * 7 % 256) as u8).collect();
    std::fs::write(send_dir.join("payload.bin"), &payload)?;

    let mut client_config = ChannelConfig::default();
    client_config.cwd = Some(send_dir);
    let mut server_config = ChannelConfig::default();
    server_config.cwd = Some(recv_dir.clone());

    let (client_stream, server_stream) = tokio::io::duplex(DUPLEX_CAPACITY);
    let mut client = Endpoint::new(client_stream, Role::Client, client_config);
    let mut server = Endpoint::new(server_stream, Role::Server, server_config);

    let (sent, received) = tokio::join!(
        client.send_file("payload.bin"),
        server.recv_file("payload.bin"),
    );

    assert_eq!(sent?, 10_000);
    assert_eq!(received?, 10_000);
    assert_eq!(std::fs::read(recv_dir.join("payload.bin"))?, payload);

    let _ = std::fs::remove_dir_all(&base);
    Ok(())
}
