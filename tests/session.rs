//! Host-side sessions against simulated bridges.

use busbridge::device::LinkSpec;
use busbridge::transport::SimTransport;
use busbridge::{Bridge, BridgeConfig, MemoryTarget, ProfileDB, Session, Transport};

fn sim(config: BridgeConfig, targets: Vec<MemoryTarget>) -> SimTransport {
    SimTransport::new(Bridge::new(config).unwrap(), targets)
}

#[test]
fn builtin_profiles_answer_sync() {
    for profile in ProfileDB::load().unwrap().profiles() {
        let mut session = Session::new_simulated(profile).unwrap();
        session.sync().unwrap();
    }
}

#[test]
fn register_round_trip() {
    let profile = ProfileDB::find("default").unwrap();
    let mut session = Session::new_simulated(&profile).unwrap();
    session.write(1, 0x100, 0x1234_5678).unwrap();
    session.write(2, 0x10, 0x9abc_def0).unwrap();
    assert_eq!(session.read(1, 0x100).unwrap(), 0x1234_5678);
    assert_eq!(session.read(2, 0x10).unwrap(), 0x9abc_def0);
    // rom is pre-filled
    assert_eq!(session.read(3, 0).unwrap(), 0xffff_ffff);
}

#[test]
fn narrow_reads_keep_high_half() {
    let profile = ProfileDB::find("narrow").unwrap();
    let mut session = Session::new_simulated(&profile).unwrap();
    session.write(0, 4, 0xabcd_1234).unwrap();
    assert_eq!(session.read(0, 4).unwrap(), 0xabcd_0000);
}

#[test]
fn aux_reaches_the_bridge() {
    let config = BridgeConfig::default();
    let mut session = Session::new(sim(config, vec![MemoryTarget::new("m", 64, 0)]), config).unwrap();
    session.set_aux(0x0000_00a5).unwrap();
    assert_eq!(session.transport().bridge().aux(), 0xa5);
}

#[test]
fn load_then_block_verify() {
    let profile = ProfileDB::find("slow").unwrap();
    let mut session = Session::new_simulated(&profile).unwrap();
    let words: Vec<u32> = (0..100).map(|i| 0x0101_0101 * i).collect();
    session.load(0, 0x20, &words).unwrap();
    session.verify(0, 0x20, &words).unwrap();

    let block = session.read_block(0, 0x20, 10, true).unwrap();
    assert_eq!(block, words[..10]);
    assert!(session.transport().bridge().is_idle());
}

#[test]
fn verify_without_block_transfer() {
    let profile = ProfileDB::find("minimal").unwrap();
    let mut session = Session::new_simulated(&profile).unwrap();
    let words = [1, 2, 3, 4];
    session.load(0, 0, &words).unwrap();
    session.verify(0, 0, &words).unwrap();
    assert!(session.read_block(0, 0, 4, true).is_err());
}

#[test]
fn verify_reports_mismatch() {
    let profile = ProfileDB::find("default").unwrap();
    let mut session = Session::new_simulated(&profile).unwrap();
    session.load(0, 0, &[5, 6, 7]).unwrap();
    session.transport_mut().targets_mut()[0].poke(1, 0);
    let err = session.verify(0, 0, &[5, 6, 7]).unwrap_err();
    assert!(err.to_string().contains("0x0001"), "{}", err);
}

#[test]
fn stalled_host_still_gets_every_word() {
    let config = BridgeConfig {
        targets: 1,
        ..Default::default()
    };
    let mut mem = MemoryTarget::new("m", 256, 0).with_latency(3, 4).with_seed(7);
    for i in 0..64 {
        mem.poke(i, 0xc000 + i as u32);
    }
    let transport = sim(config, vec![mem]).with_link(LinkSpec {
        byte_gap: 2,
        tx_stall: 5,
    });
    let mut session = Session::new(transport, config).unwrap();
    let words = session.read_block(0, 0, 64, true).unwrap();
    assert_eq!(words, (0..64).map(|i| 0xc000 + i).collect::<Vec<u32>>());
}

#[test]
fn host_rejects_bad_requests() {
    let profile = ProfileDB::find("default").unwrap();
    let mut session = Session::new_simulated(&profile).unwrap();
    assert!(session.read(4, 0).is_err());
    assert!(session.read_block(0, 0, 0, true).is_err());
    assert!(session.read_block(0, 0xfff0, 0x20, true).is_err());
    assert!(session.read_block(0, 0xfff0, 0x20, false).is_ok());
}

#[test]
fn unanswered_read_times_out() {
    // slot 1 exists in the bridge but nothing is wired to it
    let config = BridgeConfig {
        targets: 2,
        ..Default::default()
    };
    let transport = sim(config, vec![MemoryTarget::new("m", 16, 0)]).with_timeout(500);
    let mut session = Session::new(transport, config).unwrap();
    assert!(session.read_block(1, 0, 2, true).is_err());

    session.transport_mut().reset();
    session.sync().unwrap();
}

#[test]
fn transfer_refuses_commands_without_single_response() {
    let config = BridgeConfig::default();
    let mut transport = sim(config, vec![MemoryTarget::new("m", 16, 0)]);
    let width = config.response_width();
    assert!(
        transport
            .transfer(busbridge::Command::aux_csr(1), width)
            .is_err()
    );
    assert!(transport.transfer(busbridge::Command::Sync, width).is_ok());
}
