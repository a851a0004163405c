//! End-to-end scenarios driven through the public engine API.
//!
//! Frames are injected and inspected as raw bytes, exercising the codec,
//! validation, caches and conflict detection together.

use arpguard::engine::{AcdPhase, Engine, EngineSettings, EntryKind, Resolution};
use arpguard::protocol::ethernet::{Frame, FrameBuilder};
use arpguard::protocol::{ArpOp, ArpPacket, EtherType, MacAddr, VlanTag};
use arpguard::telemetry::MetricsRegistry;
use std::net::Ipv4Addr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

const ALICE_MAC: MacAddr = MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
const BOB_MAC: MacAddr = MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x02]);
const MALLORY_MAC: MacAddr = MacAddr([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);

fn alice_ip() -> Ipv4Addr {
    Ipv4Addr::new(10, 0, 0, 1)
}

fn bob_ip() -> Ipv4Addr {
    Ipv4Addr::new(10, 0, 0, 2)
}

/// Engine with one interface: Alice on 10.0.0.1/24.
fn alice_engine() -> Engine {
    alice_engine_with(EngineSettings::default())
}

fn alice_engine_with(settings: EngineSettings) -> Engine {
    let mut engine = Engine::new(settings, Arc::new(MetricsRegistry::new()));
    engine.add_interface(
        "eth0",
        ALICE_MAC,
        alice_ip(),
        Some("10.0.0.0/24".parse().unwrap()),
        None,
        false,
    );
    engine
}

fn encap(pkt: &ArpPacket, vlan: Option<VlanTag>, ethertype: EtherType) -> Vec<u8> {
    let mut builder = FrameBuilder::new()
        .dst_mac(MacAddr::BROADCAST)
        .src_mac(pkt.sender_mac);
    if let Some(tag) = vlan {
        builder = builder.vlan_tag(tag);
    }
    builder
        .ethertype(ethertype as u16)
        .payload(&pkt.to_bytes())
        .build()
}

fn arp_frame(pkt: &ArpPacket) -> Vec<u8> {
    encap(pkt, None, EtherType::Arp)
}

#[test]
fn alice_resolves_bob() {
    let mut engine = alice_engine();

    let request = ArpPacket::request(BOB_MAC, bob_ip(), alice_ip());
    let reply_frame = engine
        .step("eth0", &arp_frame(&request), 1000)
        .expect("request for our address must be answered");

    let frame = Frame::parse(&reply_frame).unwrap();
    assert_eq!(frame.dst_mac(), BOB_MAC);
    assert_eq!(frame.src_mac(), ALICE_MAC);
    assert_eq!(frame.ethertype(), EtherType::Arp as u16);

    let reply = ArpPacket::parse(frame.payload()).unwrap();
    assert_eq!(reply.op, ArpOp::Reply);
    assert_eq!(reply.sender_mac, ALICE_MAC);
    assert_eq!(reply.sender_ip, alice_ip());
    assert_eq!(reply.target_mac, BOB_MAC);
    assert_eq!(reply.target_ip, bob_ip());

    let entry = engine
        .interface("eth0")
        .unwrap()
        .cache
        .get(bob_ip())
        .expect("sender must be learned");
    assert_eq!(entry.mac, BOB_MAC);
    assert_eq!(entry.inserted_at, 1000);
    assert_eq!(entry.kind, EntryKind::Dynamic);
}

#[test]
fn broadcast_source_rejected() {
    let mut engine = alice_engine();

    let request = ArpPacket::request(MacAddr::BROADCAST, bob_ip(), alice_ip());
    assert!(engine.step("eth0", &arp_frame(&request), 1000).is_none());
    assert_eq!(engine.lookup("eth0", bob_ip(), 1000), Resolution::Unknown);
}

#[test]
fn multicast_source_rejected() {
    let mut engine = alice_engine();

    let request = ArpPacket::request(
        MacAddr([0x01, 0x00, 0x5e, 0x00, 0x00, 0x01]),
        bob_ip(),
        alice_ip(),
    );
    assert!(engine.step("eth0", &arp_frame(&request), 1000).is_none());
    assert_eq!(engine.lookup("eth0", bob_ip(), 1000), Resolution::Unknown);
}

#[test]
fn static_entries_are_immutable() {
    let mut engine = alice_engine();
    let gateway_ip = Ipv4Addr::new(10, 0, 0, 254);
    let gateway_mac = MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0xFE]);
    engine.add_static_entry("eth0", gateway_ip, gateway_mac).unwrap();

    // A poisoning attempt: unsolicited reply re-claiming the gateway
    let poison = ArpPacket::reply(MALLORY_MAC, gateway_ip, ALICE_MAC, alice_ip());
    engine.step("eth0", &arp_frame(&poison), 1000);

    let entry = engine.interface("eth0").unwrap().cache.get(gateway_ip).unwrap();
    assert_eq!(entry.mac, gateway_mac);
    assert_eq!(entry.kind, EntryKind::Static);
    assert_eq!(
        engine.lookup("eth0", gateway_ip, u64::MAX),
        Resolution::Resolved(gateway_mac)
    );
}

#[test]
fn flood_limit_suppresses_sixth_request() {
    let mut engine = alice_engine();
    let target = Ipv4Addr::new(10, 0, 0, 9);

    let mut emitted = 0;
    for t in [0, 100, 200, 300, 400] {
        if engine.request("eth0", target, t).is_some() {
            emitted += 1;
        }
    }
    assert_eq!(emitted, 5);
    assert!(engine.request("eth0", target, 500).is_none());

    let pending = &engine.interface("eth0").unwrap().pending;
    assert_eq!(pending.len(), 1);
    assert!(pending.contains(target));
}

#[test]
fn cross_subnet_sender_dropped() {
    let mut engine = Engine::new(EngineSettings::default(), Arc::new(MetricsRegistry::new()));
    engine.add_interface(
        "eth1",
        ALICE_MAC,
        Ipv4Addr::new(192, 168, 1, 1),
        Some("192.168.1.0/24".parse().unwrap()),
        None,
        false,
    );

    let request = ArpPacket::request(BOB_MAC, Ipv4Addr::new(10, 0, 0, 7), Ipv4Addr::new(192, 168, 1, 1));
    assert!(engine.step("eth1", &arp_frame(&request), 1000).is_none());
    assert_eq!(
        engine.lookup("eth1", Ipv4Addr::new(10, 0, 0, 7), 1000),
        Resolution::Unknown
    );
    assert!(engine.interface("eth1").unwrap().cache.is_empty());
}

#[test]
fn dad_conflict_during_probing() {
    let mut engine = alice_engine();
    let candidate = Ipv4Addr::new(10, 0, 0, 5);

    engine.start_dad("eth0", candidate, 0, 7).unwrap();
    assert_eq!(engine.acd_phase("eth0"), Some(AcdPhase::Probing));
    engine.tick(0);

    // Someone already holds the candidate
    let claim = ArpPacket::reply(MALLORY_MAC, candidate, ALICE_MAC, alice_ip());
    assert!(engine.step("eth0", &arp_frame(&claim), 500).is_none());

    assert_eq!(engine.acd_phase("eth0"), Some(AcdPhase::Conflict));
    // The candidate was never bound
    assert_eq!(engine.interface("eth0").unwrap().ip, alice_ip());
    // And the conflicting claim did not poison the cache
    assert_eq!(engine.lookup("eth0", candidate, 500), Resolution::Unknown);
}

#[test]
fn dad_completes_and_binds_candidate() {
    let mut engine = alice_engine();
    let candidate = Ipv4Addr::new(10, 0, 0, 9);

    engine.start_dad("eth0", candidate, 0, 42).unwrap();

    let mut probes = 0;
    let mut announcements = 0;
    for t in (0..20_000).step_by(100) {
        for (iface, frame) in engine.tick(t) {
            assert_eq!(iface, "eth0");
            let parsed = Frame::parse(&frame).unwrap();
            assert_eq!(parsed.dst_mac(), MacAddr::BROADCAST);
            let pkt = ArpPacket::parse(parsed.payload()).unwrap();
            assert_eq!(pkt.op, ArpOp::Request);
            if pkt.sender_ip.is_unspecified() {
                assert_eq!(pkt.target_ip, candidate);
                probes += 1;
            } else {
                assert!(pkt.is_gratuitous());
                assert_eq!(pkt.sender_ip, candidate);
                announcements += 1;
            }
        }
        if engine.acd_phase("eth0") == Some(AcdPhase::Bound) {
            break;
        }
    }

    assert_eq!(probes, 3);
    assert_eq!(announcements, 2);
    assert_eq!(engine.acd_phase("eth0"), Some(AcdPhase::Bound));
    assert_eq!(engine.interface("eth0").unwrap().ip, candidate);
}

#[test]
fn bound_address_is_defended() {
    let mut engine = alice_engine();

    engine.start_dad("eth0", alice_ip(), 0, 1).unwrap();
    for t in (0..20_000).step_by(100) {
        engine.tick(t);
        if engine.acd_phase("eth0") == Some(AcdPhase::Bound) {
            break;
        }
    }
    assert_eq!(engine.acd_phase("eth0"), Some(AcdPhase::Bound));

    // A foreign claim on our bound address
    let claim = ArpPacket::announcement(MALLORY_MAC, alice_ip());
    assert!(engine.step("eth0", &arp_frame(&claim), 30_000).is_none());
    assert_eq!(engine.acd_phase("eth0"), Some(AcdPhase::Defending));

    // The defense goes out on the next tick, as a gratuitous announcement
    let frames = engine.tick(30_100);
    assert_eq!(frames.len(), 1);
    let parsed = Frame::parse(&frames[0].1).unwrap();
    let defense = ArpPacket::parse(parsed.payload()).unwrap();
    assert!(defense.is_gratuitous());
    assert_eq!(defense.sender_ip, alice_ip());
    assert_eq!(defense.sender_mac, ALICE_MAC);

    // Quiet afterwards: back to Bound
    engine.tick(41_000);
    assert_eq!(engine.acd_phase("eth0"), Some(AcdPhase::Bound));
}

#[test]
fn failed_resolution_goes_negative_then_recovers() {
    let mut engine = alice_engine();
    let target = Ipv4Addr::new(10, 0, 0, 9);

    engine.request("eth0", target, 0);
    for t in [1_000, 2_000, 3_000, 4_000] {
        engine.tick(t);
    }

    assert_eq!(engine.lookup("eth0", target, 4_000), Resolution::Negative);
    assert!(engine.request("eth0", target, 4_100).is_none());

    // An unsolicited reply from the target resolves it and clears the
    // negative record
    let reply = ArpPacket::reply(BOB_MAC, target, ALICE_MAC, alice_ip());
    engine.step("eth0", &arp_frame(&reply), 5_000);
    assert_eq!(
        engine.lookup("eth0", target, 5_000),
        Resolution::Resolved(BOB_MAC)
    );
}

#[test]
fn dynamic_entries_age_out() {
    let mut engine = alice_engine();

    let request = ArpPacket::request(BOB_MAC, bob_ip(), alice_ip());
    engine.step("eth0", &arp_frame(&request), 0);
    assert_eq!(engine.lookup("eth0", bob_ip(), 0), Resolution::Resolved(BOB_MAC));

    // Expired before the sweep
    assert_eq!(engine.lookup("eth0", bob_ip(), 300_000), Resolution::Unknown);

    engine.tick(300_000);
    assert!(engine.interface("eth0").unwrap().cache.is_empty());
}

#[test]
fn bounded_tables_never_exceeded() {
    let settings = EngineSettings {
        max_cache: 8,
        max_negative: 4,
        max_flood: 4,
        max_pending: 4,
        ..EngineSettings::default()
    };
    let mut engine = Engine::new(settings, Arc::new(MetricsRegistry::new()));
    engine.add_interface(
        "eth0",
        ALICE_MAC,
        alice_ip(),
        Some("10.0.0.0/8".parse().unwrap()),
        None,
        false,
    );

    // 100 distinct senders all addressed to us
    for i in 0..100u8 {
        let sender_ip = Ipv4Addr::new(10, 0, 1, i);
        let sender_mac = MacAddr([0x02, 0, 0, 0, 1, i]);
        let request = ArpPacket::request(sender_mac, sender_ip, alice_ip());
        engine.step("eth0", &arp_frame(&request), i as u64);
    }
    assert_eq!(engine.interface("eth0").unwrap().cache.len(), 8);

    // 100 distinct unresolved targets
    for i in 0..100u8 {
        engine.request("eth0", Ipv4Addr::new(10, 0, 2, i), 1_000 + i as u64);
    }
    let iface = engine.interface("eth0").unwrap();
    assert!(iface.pending.len() <= 4);

    engine.tick(2_000);
    let metrics = engine.metrics();
    assert!(metrics.flood_size.load(Ordering::Relaxed) <= 4);
    assert!(metrics.pending_size.load(Ordering::Relaxed) <= 4);
    assert!(metrics.negative_size.load(Ordering::Relaxed) <= 4);
    assert!(metrics.cache_size.load(Ordering::Relaxed) <= 8);
}

#[test]
fn tick_never_grows_tables() {
    let mut engine = alice_engine();

    for i in 0..10u8 {
        let request = ArpPacket::request(
            MacAddr([0x02, 0, 0, 0, 1, i]),
            Ipv4Addr::new(10, 0, 0, 100 + i),
            alice_ip(),
        );
        engine.step("eth0", &arp_frame(&request), i as u64);
        engine.request("eth0", Ipv4Addr::new(10, 0, 0, 50 + i), i as u64);
    }

    let before = {
        let iface = engine.interface("eth0").unwrap();
        (iface.cache.len(), iface.negative.len(), iface.pending.len())
    };

    engine.tick(500);

    let iface = engine.interface("eth0").unwrap();
    assert!(iface.cache.len() <= before.0);
    assert!(iface.negative.len() <= before.1);
    assert!(iface.pending.len() <= before.2);
}

#[test]
fn replies_are_never_broadcast_or_multicast() {
    let mut engine = alice_engine();
    engine.add_reverse_mapping(BOB_MAC, bob_ip());

    let inputs = [
        ArpPacket::request(BOB_MAC, bob_ip(), alice_ip()),
        ArpPacket::reply(BOB_MAC, bob_ip(), ALICE_MAC, alice_ip()),
        ArpPacket::announcement(BOB_MAC, bob_ip()),
        ArpPacket::probe(BOB_MAC, Ipv4Addr::new(10, 0, 0, 77)),
    ];

    for (i, pkt) in inputs.iter().enumerate() {
        if let Some(reply) = engine.step("eth0", &arp_frame(pkt), i as u64) {
            let frame = Frame::parse(&reply).unwrap();
            assert!(!frame.dst_mac().is_broadcast(), "input {} broadcast reply", i);
            assert!(!frame.dst_mac().is_multicast(), "input {} multicast reply", i);
        }
    }
}

#[test]
fn identical_inputs_produce_identical_outputs() {
    let run = || {
        let mut engine = alice_engine();
        let mut transcript: Vec<Vec<u8>> = Vec::new();

        engine.start_dad("eth0", Ipv4Addr::new(10, 0, 0, 9), 0, 12345).unwrap();

        let request = ArpPacket::request(BOB_MAC, bob_ip(), alice_ip());
        if let Some(f) = engine.step("eth0", &arp_frame(&request), 100) {
            transcript.push(f);
        }
        if let Some(f) = engine.request("eth0", Ipv4Addr::new(10, 0, 0, 30), 200) {
            transcript.push(f);
        }
        for t in (250..10_000).step_by(250) {
            for (_, f) in engine.tick(t) {
                transcript.push(f);
            }
        }
        transcript
    };

    assert_eq!(run(), run());
}

#[test]
fn vlan_tag_copied_onto_reply() {
    let mut engine = alice_engine();
    let tag = VlanTag {
        pcp: 5,
        dei: false,
        vid: 42,
    };

    let request = ArpPacket::request(BOB_MAC, bob_ip(), alice_ip());
    let reply_frame = engine
        .step("eth0", &encap(&request, Some(tag), EtherType::Arp), 1000)
        .unwrap();

    let frame = Frame::parse(&reply_frame).unwrap();
    assert_eq!(frame.vlan_tag(), Some(tag));
    assert_eq!(frame.ethertype(), EtherType::Arp as u16);
}

#[test]
fn untagged_request_gets_untagged_reply() {
    let mut engine = alice_engine();

    let request = ArpPacket::request(BOB_MAC, bob_ip(), alice_ip());
    let reply_frame = engine.step("eth0", &arp_frame(&request), 1000).unwrap();
    assert!(Frame::parse(&reply_frame).unwrap().vlan_tag().is_none());
}

#[test]
fn configured_vlan_applied_to_outbound_requests() {
    let mut engine = Engine::new(EngineSettings::default(), Arc::new(MetricsRegistry::new()));
    engine.add_interface(
        "trunk0",
        ALICE_MAC,
        alice_ip(),
        Some("10.0.0.0/24".parse().unwrap()),
        Some(VlanTag::new(100)),
        false,
    );

    let frame = engine.request("trunk0", bob_ip(), 0).unwrap();
    let parsed = Frame::parse(&frame).unwrap();
    assert_eq!(parsed.vlan_tag(), Some(VlanTag::new(100)));
    assert_eq!(parsed.dst_mac(), MacAddr::BROADCAST);
}

#[test]
fn rarp_round_trip() {
    let mut engine = Engine::new(EngineSettings::default(), Arc::new(MetricsRegistry::new()));
    engine.add_interface(
        "eth0",
        ALICE_MAC,
        alice_ip(),
        Some("10.0.0.0/24".parse().unwrap()),
        None,
        true,
    );
    let boot_mac = MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x42]);
    engine.add_reverse_mapping(boot_mac, Ipv4Addr::new(10, 0, 0, 42));

    let request = ArpPacket {
        op: ArpOp::RarpRequest,
        sender_mac: boot_mac,
        sender_ip: Ipv4Addr::UNSPECIFIED,
        target_mac: boot_mac,
        target_ip: Ipv4Addr::UNSPECIFIED,
    };
    let reply_frame = engine
        .step("eth0", &encap(&request, None, EtherType::Rarp), 0)
        .expect("mapped MAC must be answered");

    let frame = Frame::parse(&reply_frame).unwrap();
    assert_eq!(frame.ethertype(), EtherType::Rarp as u16);
    assert_eq!(frame.dst_mac(), boot_mac);

    let reply = ArpPacket::parse(frame.payload()).unwrap();
    assert_eq!(reply.op, ArpOp::RarpReply);
    assert_eq!(reply.target_mac, boot_mac);
    assert_eq!(reply.target_ip, Ipv4Addr::new(10, 0, 0, 42));
}

#[test]
fn rarp_rejected_when_disabled() {
    let mut engine = alice_engine();
    let boot_mac = MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x42]);
    engine.add_reverse_mapping(boot_mac, Ipv4Addr::new(10, 0, 0, 42));

    let request = ArpPacket {
        op: ArpOp::RarpRequest,
        sender_mac: boot_mac,
        sender_ip: Ipv4Addr::UNSPECIFIED,
        target_mac: boot_mac,
        target_ip: Ipv4Addr::UNSPECIFIED,
    };
    assert!(engine
        .step("eth0", &encap(&request, None, EtherType::Rarp), 0)
        .is_none());
}

#[test]
fn truncated_and_corrupt_frames_dropped() {
    let mut engine = alice_engine();

    // Truncated
    assert!(engine.step("eth0", &[0u8; 10], 0).is_none());

    // Valid frame, corrupted in flight
    let request = ArpPacket::request(BOB_MAC, bob_ip(), alice_ip());
    let mut frame = arp_frame(&request);
    frame[25] ^= 0x40;
    assert!(engine.step("eth0", &frame, 0).is_none());
    assert_eq!(engine.lookup("eth0", bob_ip(), 0), Resolution::Unknown);
}

#[test]
fn foreign_claim_on_own_address_is_ignored() {
    let mut engine = alice_engine();

    // Mallory claims to be us; no detection cycle is running
    let spoof = ArpPacket::request(MALLORY_MAC, alice_ip(), bob_ip());
    assert!(engine.step("eth0", &arp_frame(&spoof), 0).is_none());

    // The spoofed binding was not learned
    assert_eq!(engine.lookup("eth0", alice_ip(), 0), Resolution::Unknown);
    assert_eq!(engine.metrics().conflicts_observed.get(), 1);
}
