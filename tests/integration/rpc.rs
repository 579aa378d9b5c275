//! Parameter RPC integration tests
//!
//! Callers run on their own thread against a worker (or the interception layer)
//! polled from the test thread, the way a UI process talks to the audio side.

use sidecar::plugin::protocol::RPC_REJECTED;
use sidecar::plugin::{ParamBlock, PluginError};
use sidecar::prelude::*;
use sidecar::shim::InProcessPlugin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

#[path = "../helpers/mod.rs"]
mod helpers;
use helpers::*;

fn rpc_config(mode: RpcMode) -> RpcConfig {
    RpcConfig {
        poll_interval_us: 100,
        timeout_ms: 2000,
        mode,
    }
}

/// Run `caller` on a thread while `poll` serves requests on this one.
fn serve_while(param: &ParamBlock, caller: impl FnOnce(&ParamBlock) + Send, mut poll: impl FnMut()) {
    let done = AtomicBool::new(false);
    std::thread::scope(|s| {
        s.spawn(|| {
            caller(param);
            done.store(true, Ordering::Release);
        });
        let deadline = Instant::now() + Duration::from_secs(10);
        while !done.load(Ordering::Acquire) && Instant::now() < deadline {
            poll();
            std::thread::sleep(Duration::from_micros(100));
        }
    });
    assert!(done.load(Ordering::Acquire), "caller did not finish");
}

/// A request nobody answers fails after the timeout.
#[test]
fn test_unanswered_request_times_out() {
    let fx = ShimFixture::new();
    let param = fx.shim.channels().param().unwrap();
    let client = ParamClient::new(
        param,
        RpcConfig {
            timeout_ms: 100,
            ..Default::default()
        },
    );

    let started = Instant::now();
    let err = client.get(0, "level").unwrap_err();
    assert!(matches!(err, PluginError::Timeout { duration_ms: 100, .. }));
    assert!(started.elapsed() >= Duration::from_millis(100));
}

/// GET of an unknown key comes back with `error = 1`.
#[test]
fn test_unknown_key_rejected_by_worker() {
    let fx = ShimFixture::new();
    let mut host = SlotHost::new(2);
    host.insert(0, LevelPlugin::boxed(12).0).unwrap();
    let mut worker = Worker::new(fx.worker_config(), host).unwrap();
    let param = fx.shim.channels().param().unwrap();

    serve_while(
        param,
        |param| {
            let client = ParamClient::new(param, rpc_config(RpcMode::Compat));
            assert!(matches!(
                client.get(0, "cutoff"),
                Err(PluginError::Rpc { code: 1 })
            ));
            assert_eq!(param.error.load(Ordering::Acquire), RPC_REJECTED);

            assert_eq!(client.get(0, "level").unwrap(), "12");
            client.set(0, "level", "-3").unwrap();
            assert_eq!(client.get(0, "level").unwrap(), "-3");
            assert!(matches!(
                client.get(1, "level"),
                Err(PluginError::Rpc { code: 2 })
            ));
        },
        || {
            worker.step();
        },
    );
}

/// Sequenced callers on two threads never see each other's answers.
#[test]
fn test_sequenced_callers_share_block() {
    let fx = ShimFixture::new();
    let mut host = SlotHost::new(2);
    host.insert(0, LevelPlugin::boxed(1).0).unwrap();
    host.insert(1, LevelPlugin::boxed(2).0).unwrap();
    let mut worker = Worker::new(fx.worker_config(), host).unwrap();
    let param = fx.shim.channels().param().unwrap();

    serve_while(
        param,
        |param| {
            let client = ParamClient::new(param, rpc_config(RpcMode::Sequenced));
            std::thread::scope(|s| {
                for slot in 0..2u8 {
                    let client = &client;
                    s.spawn(move || {
                        for _ in 0..10 {
                            let expected = (slot + 1).to_string();
                            assert_eq!(client.get(slot, "level").unwrap(), expected);
                        }
                    });
                }
            });
        },
        || {
            worker.step();
        },
    );
}

/// With no worker ready, the interception layer answers for its in-process plugin.
#[test]
fn test_inprocess_plugin_serves_slot_zero() {
    let mut fx = ShimFixture::new();
    fx.shim
        .host_inprocess(Some(InProcessPlugin::new(LevelPlugin::boxed(9).0)));
    let worker_view = ChannelSet::open(&fx.channels());
    let param = worker_view.param().unwrap();

    serve_while(
        param,
        |param| {
            let client = ParamClient::new(param, rpc_config(RpcMode::Compat));
            assert_eq!(client.get(0, "level").unwrap(), "9");
            assert!(matches!(
                client.get(3, "level"),
                Err(PluginError::Rpc { code: 1 })
            ));
        },
        || {
            fx.tick();
        },
    );
}
