mod common;

use common::{acks, client, replies, Harness, ADMIN_PASSWORD, GUEST_PASSWORD};
use meshroom::mesh::{Dispatch, InboundPacket, PayloadType};
use meshroom::room::codec::{ack_digest, encode_text, TextMessage, TextType, MAX_POST_TEXT_LEN};

#[test]
fn post_is_stored_and_acked() {
    let mut h = Harness::new();
    let alice = client(1);
    h.login(&alice, 100, 0, GUEST_PASSWORD);
    h.drain();

    h.post(&alice, 200, "hi all");
    let sent = h.drain();
    let acks = acks(&sent);
    assert_eq!(acks.len(), 1);
    let expected = ack_digest(&encode_text(200, TextType::Plain, 0, b"hi all"), &alice);
    assert_eq!(acks[0].0, expected);
    assert_eq!(acks[0].1, Dispatch::Flood { delay_millis: 0 });
    assert!(replies(&sent).is_empty());

    let post = h.room.posts().newest().unwrap();
    assert_eq!(post.text, b"hi all");
    assert_eq!(post.author, alice);
    assert_eq!(h.session(&alice).last_timestamp, 200);
}

#[test]
fn resubmitted_post_is_stored_once_and_acked_twice() {
    let mut h = Harness::new();
    let alice = client(1);
    h.login(&alice, 100, 0, GUEST_PASSWORD);
    h.drain();

    h.post(&alice, 200, "once");
    h.post(&alice, 200, "once");
    let acks = acks(&h.drain());
    assert_eq!(acks.len(), 2);
    assert_eq!(acks[0].0, acks[1].0);
    assert_eq!(h.room.posts().len(), 1);
}

#[test]
fn older_timestamp_is_dropped_silently() {
    let mut h = Harness::new();
    let alice = client(1);
    h.login(&alice, 100, 0, GUEST_PASSWORD);
    h.post(&alice, 200, "new");
    h.drain();

    h.post(&alice, 150, "old");
    assert!(h.drain().is_empty());
    assert_eq!(h.room.posts().len(), 1);
    assert_eq!(h.session(&alice).last_timestamp, 200);
}

#[test]
fn ack_goes_direct_when_path_known() {
    let mut h = Harness::new();
    let alice = client(1);
    h.login(&alice, 100, 0, GUEST_PASSWORD);
    h.set_path(&alice, &[7]);
    h.drain();

    h.post(&alice, 101, "via path");
    assert_eq!(
        acks(&h.drain())[0].1,
        Dispatch::Direct {
            path: vec![7],
            delay_millis: 0
        }
    );
}

#[test]
fn padding_is_not_part_of_the_ack() {
    let mut h = Harness::new();
    let alice = client(1);
    h.login(&alice, 100, 0, GUEST_PASSWORD);
    h.drain();

    let mut data = encode_text(300, TextType::Plain, 1, b"padded");
    let unpadded = data.clone();
    data.extend_from_slice(&[0; 10]);
    let handle = h.handle(&alice);
    h.room.on_peer_data(
        &mut h.outbox,
        &InboundPacket::direct(),
        handle,
        PayloadType::TxtMsg,
        &data,
    );
    assert_eq!(acks(&h.drain())[0].0, ack_digest(&unpadded, &alice));
    assert_eq!(h.room.posts().newest().unwrap().text, b"padded");
}

#[test]
fn long_post_is_truncated() {
    let mut h = Harness::new();
    let alice = client(1);
    h.login(&alice, 100, 0, GUEST_PASSWORD);
    let text = "x".repeat(170);
    h.post(&alice, 101, &text);
    assert_eq!(h.room.posts().newest().unwrap().text.len(), MAX_POST_TEXT_LEN);
}

#[test]
fn signed_plain_from_client_is_rejected() {
    let mut h = Harness::new();
    let alice = client(1);
    h.login(&alice, 100, 0, GUEST_PASSWORD);
    h.drain();
    h.text(&alice, 101, TextType::SignedPlain, "forged");
    assert!(h.drain().is_empty());
    assert!(h.room.posts().is_empty());
    assert_eq!(h.session(&alice).last_timestamp, 100);
}

#[test]
fn admin_command_replies_without_ack() {
    let mut h = Harness::new();
    let admin = client(5);
    h.login(&admin, 100, 0, ADMIN_PASSWORD);
    h.drain();

    h.command(&admin, 400, "ver");
    let sent = h.drain();
    assert!(acks(&sent).is_empty());
    let replies = replies(&sent);
    assert_eq!(replies.len(), 1);
    let (to, payload, dispatch) = &replies[0];
    assert_eq!(*to, admin);
    assert_eq!(*dispatch, Dispatch::Flood { delay_millis: 0 });
    let msg = TextMessage::decode(payload).unwrap();
    assert_eq!(msg.text_type, TextType::CliData);
    assert_ne!(msg.timestamp, 400);
    assert!(msg.text_lossy().starts_with("meshroom v"));
}

#[test]
fn retried_command_is_not_executed_again() {
    let mut h = Harness::new();
    let admin = client(5);
    h.login(&admin, 100, 0, ADMIN_PASSWORD);
    h.drain();

    h.command(&admin, 400, "set name First");
    assert_eq!(replies(&h.drain()).len(), 1);
    assert_eq!(h.room.config().room.name, "First");

    h.command(&admin, 400, "set name Second");
    let sent = h.drain();
    assert!(sent.is_empty());
    assert_eq!(h.room.config().room.name, "First");
}

#[test]
fn guest_commands_get_nothing() {
    let mut h = Harness::new();
    let guest = client(6);
    h.login(&guest, 100, 0, GUEST_PASSWORD);
    h.drain();

    h.command(&guest, 150, "set name Pwned");
    assert!(h.drain().is_empty());
    assert_eq!(h.room.config().room.name, "Test Room");
    // the timestamp still counts for replay protection
    assert_eq!(h.session(&guest).last_timestamp, 150);
}
