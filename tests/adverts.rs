mod common;

use common::{client, config, Harness, ADMIN_PASSWORD};
use meshroom::mesh::advert::{AdvertData, NodeType};
use meshroom::mesh::{Dispatch, OutboundPacket, SentPacket};

fn adverts(sent: &[SentPacket]) -> Vec<(AdvertData, Dispatch)> {
    sent.iter()
        .filter_map(|s| match &s.packet {
            OutboundPacket::Advert { app_data } => {
                Some((AdvertData::parse(app_data).ok()?, s.dispatch.clone()))
            }
            _ => None,
        })
        .collect()
}

#[test]
fn startup_advert_is_a_delayed_flood() {
    let mut cfg = config();
    cfg.room.latitude = -33.5;
    cfg.room.longitude = 151.25;
    let mut h = Harness::with_config(cfg);
    h.room.begin(&mut h.outbox);

    let ads = adverts(&h.drain());
    assert_eq!(ads.len(), 1);
    let (data, dispatch) = &ads[0];
    assert_eq!(*dispatch, Dispatch::Flood { delay_millis: 2000 });
    assert_eq!(data.node_type, NodeType::Room);
    assert_eq!(data.name.as_deref(), Some("Test Room"));
    assert_eq!(data.latitude(), -33.5);
    assert_eq!(data.longitude(), 151.25);
}

#[test]
fn periodic_advert_is_zero_hop() {
    let mut cfg = config();
    cfg.room.advert_interval = 1;
    let mut h = Harness::with_config(cfg);
    h.room.begin(&mut h.outbox);
    h.drain();

    h.step(119_999);
    assert!(adverts(&h.drain()).is_empty());
    h.step(1);
    let ads = adverts(&h.drain());
    assert_eq!(ads.len(), 1);
    assert_eq!(ads[0].1, Dispatch::ZeroHop);
    // rescheduled for the next interval
    assert_eq!(h.room.next_advert_at(), Some(240_000));
}

#[test]
fn zero_interval_disables_periodic_advert() {
    let mut h = Harness::new();
    h.room.begin(&mut h.outbox);
    h.drain();
    assert_eq!(h.room.next_advert_at(), None);
    h.step(10 * 60_000);
    assert!(adverts(&h.drain()).is_empty());
}

#[test]
fn advert_command_sends_immediately() {
    let mut h = Harness::new();
    let admin = client(5);
    h.login(&admin, 100, 0, ADMIN_PASSWORD);
    h.drain();
    h.command(&admin, 101, "advert");
    let ads = adverts(&h.drain());
    assert_eq!(ads.len(), 1);
    assert_eq!(ads[0].1, Dispatch::Flood { delay_millis: 0 });
}

#[test]
fn changing_interval_rearms_timer() {
    let mut h = Harness::new();
    h.room.begin(&mut h.outbox);
    h.clock.advance(1_000);
    let reply = h.room.handle_console_command(&mut h.outbox, "set advert.interval 60");
    assert_eq!(reply, "OK");
    assert_eq!(h.room.next_advert_at(), Some(1_000 + 60 * 60_000));
    h.room.handle_console_command(&mut h.outbox, "set advert.interval 0");
    assert_eq!(h.room.next_advert_at(), None);
}
