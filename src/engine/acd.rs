//! IPv4 address conflict detection - RFC 5227
//!
//! Probe/Announce/Defend lifecycle for one candidate address per interface.
//! The machine is driven by `observe` (inbound packets) and `tick` (time);
//! it never performs I/O itself, it only returns packets to send.

use super::rng::SplitMix64;
use crate::protocol::{ArpOp, ArpPacket, MacAddr};
use std::net::Ipv4Addr;

/// Minimum delay between probes
pub const PROBE_MIN_MS: u64 = 1_000;
/// Maximum delay between probes
pub const PROBE_MAX_MS: u64 = 2_000;
/// Quiet period after the last probe before announcing
pub const PROBE_WAIT_MS: u64 = 1_000;
/// Delay between announcements
pub const ANNOUNCE_INTERVAL_MS: u64 = 2_000;

/// Externally observable phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcdPhase {
    Idle,
    Probing,
    Announcing,
    Bound,
    Defending,
    Conflict,
}

/// Signal back to the dispatcher when a packet was consumed by the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcdEvent {
    /// The candidate (or bound address) lost; terminal for this candidate
    ConflictDetected,
    /// The bound address is being contested; a defense will go out on the
    /// next tick
    DefenseScheduled,
}

#[derive(Debug, Clone)]
enum State {
    Idle,
    Probing {
        candidate: Ipv4Addr,
        probes_sent: u8,
        next_probe_at: u64,
        last_probe_at: u64,
    },
    Announcing {
        candidate: Ipv4Addr,
        announced: u8,
        next_announce_at: u64,
    },
    Bound,
    Defending {
        last_defense_at: u64,
        defense_pending: bool,
    },
    Conflict,
}

/// Packets produced by a tick, plus the address that just finished
/// announcing, if any.
#[derive(Debug, Default)]
pub struct AcdTick {
    pub packets: Vec<ArpPacket>,
    pub bound: Option<Ipv4Addr>,
}

/// Per-interface conflict-detection machine
#[derive(Debug, Clone)]
pub struct Acd {
    state: State,
    rng: SplitMix64,
    probe_num: u8,
    announce_num: u8,
    defend_interval: u64,
}

impl Acd {
    pub fn new(probe_num: u8, announce_num: u8, defend_interval_ms: u64) -> Self {
        Self {
            state: State::Idle,
            rng: SplitMix64::new(0),
            probe_num,
            announce_num,
            defend_interval: defend_interval_ms,
        }
    }

    /// Begin probing a candidate address. The first probe goes out on the
    /// next tick; later probes are jittered from the seeded stream.
    pub fn start(&mut self, candidate: Ipv4Addr, now: u64, seed: u64) {
        self.rng = SplitMix64::new(seed);
        self.state = State::Probing {
            candidate,
            probes_sent: 0,
            next_probe_at: now,
            last_probe_at: now,
        };
    }

    pub fn phase(&self) -> AcdPhase {
        match self.state {
            State::Idle => AcdPhase::Idle,
            State::Probing { .. } => AcdPhase::Probing,
            State::Announcing { .. } => AcdPhase::Announcing,
            State::Bound => AcdPhase::Bound,
            State::Defending { .. } => AcdPhase::Defending,
            State::Conflict => AcdPhase::Conflict,
        }
    }

    /// The address currently being probed or announced, if any.
    pub fn candidate(&self) -> Option<Ipv4Addr> {
        match self.state {
            State::Probing { candidate, .. } | State::Announcing { candidate, .. } => {
                Some(candidate)
            }
            _ => None,
        }
    }

    /// Feed an inbound packet. Returns the event when the packet is a
    /// conflict signal for this machine; the dispatcher then drops it.
    pub fn observe(
        &mut self,
        pkt: &ArpPacket,
        own_mac: MacAddr,
        own_ip: Ipv4Addr,
        now: u64,
    ) -> Option<AcdEvent> {
        if pkt.sender_mac == own_mac {
            return None;
        }

        match &mut self.state {
            State::Probing { candidate, .. } => {
                // A claim on the candidate, or a competing probe for it
                let claimed = pkt.sender_ip == *candidate;
                let competing_probe = pkt.op == ArpOp::Request
                    && pkt.sender_ip.is_unspecified()
                    && pkt.target_ip == *candidate;
                if claimed || competing_probe {
                    self.state = State::Conflict;
                    return Some(AcdEvent::ConflictDetected);
                }
                None
            }
            State::Announcing { candidate, .. } => {
                if pkt.sender_ip == *candidate {
                    self.state = State::Conflict;
                    return Some(AcdEvent::ConflictDetected);
                }
                None
            }
            State::Bound => {
                if pkt.sender_ip == own_ip {
                    self.state = State::Defending {
                        last_defense_at: now,
                        defense_pending: true,
                    };
                    return Some(AcdEvent::DefenseScheduled);
                }
                None
            }
            State::Defending {
                last_defense_at,
                defense_pending,
            } => {
                if pkt.sender_ip == own_ip {
                    if now.saturating_sub(*last_defense_at) < self.defend_interval {
                        // Contested again too soon: give up the address
                        self.state = State::Conflict;
                        return Some(AcdEvent::ConflictDetected);
                    }
                    *last_defense_at = now;
                    *defense_pending = true;
                    return Some(AcdEvent::DefenseScheduled);
                }
                None
            }
            State::Idle | State::Conflict => None,
        }
    }

    /// Advance the machine. At most one probe or announcement is emitted
    /// per call; a probe-to-announce transition may emit the first
    /// announcement in the same call.
    pub fn tick(&mut self, own_mac: MacAddr, own_ip: Ipv4Addr, now: u64) -> AcdTick {
        let mut out = AcdTick::default();

        loop {
            match &mut self.state {
                State::Probing {
                    candidate,
                    probes_sent,
                    next_probe_at,
                    last_probe_at,
                } => {
                    if *probes_sent < self.probe_num {
                        if now >= *next_probe_at {
                            out.packets.push(ArpPacket::probe(own_mac, *candidate));
                            *probes_sent += 1;
                            *last_probe_at = now;
                            *next_probe_at =
                                now + self.rng.next_range(PROBE_MIN_MS, PROBE_MAX_MS);
                        }
                        return out;
                    }
                    if now >= *last_probe_at + PROBE_WAIT_MS {
                        self.state = State::Announcing {
                            candidate: *candidate,
                            announced: 0,
                            next_announce_at: now,
                        };
                        continue;
                    }
                    return out;
                }
                State::Announcing {
                    candidate,
                    announced,
                    next_announce_at,
                } => {
                    if now >= *next_announce_at {
                        out.packets
                            .push(ArpPacket::announcement(own_mac, *candidate));
                        *announced += 1;
                        if *announced >= self.announce_num {
                            out.bound = Some(*candidate);
                            self.state = State::Bound;
                        } else {
                            *next_announce_at = now + ANNOUNCE_INTERVAL_MS;
                        }
                    }
                    return out;
                }
                State::Defending {
                    last_defense_at,
                    defense_pending,
                } => {
                    if *defense_pending {
                        out.packets.push(ArpPacket::announcement(own_mac, own_ip));
                        *defense_pending = false;
                        return out;
                    }
                    if now.saturating_sub(*last_defense_at) >= self.defend_interval {
                        self.state = State::Bound;
                    }
                    return out;
                }
                State::Idle | State::Bound | State::Conflict => return out,
            }
        }
    }
}
