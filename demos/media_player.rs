//! Media Player Active Object
//!
//! This example runs a hierarchical player on its own worker thread and
//! delivers notifications to the main thread through a delivery loop.
//!
//! Key concepts:
//! - Active state machine with asynchronous and synchronous sends
//! - Priority events jumping ahead of queued ones
//! - Guards reading event arguments
//! - Actions producing a result reported on completion
//! - Notifications marshaled to a host-owned thread
//!
//! Run with: cargo run --example media_player

use statecraft::active::{ActiveConfig, ActiveStateMachine};
use statecraft::builder::{StateMachineBuilder, TransitionBuilder};
use statecraft::core::{EventArgs, HistoryType};
use statecraft::identifier_enum;
use statecraft::notify::{delivery_loop, Notification};
use std::sync::Arc;

identifier_enum! {
    enum Player {
        Stopped,
        Active,
        Playing,
        Paused,
    }
}

identifier_enum! {
    enum Command {
        Play,
        Pause,
        Stop,
        Seek,
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Media Player Active Object ===\n");

    let tree = StateMachineBuilder::new()
        .substates(
            Player::Active,
            [Player::Playing, Player::Paused],
            Player::Playing,
            HistoryType::Shallow,
        )
        .on_entry(Player::Playing, |_| {
            println!("  [worker] speaker on");
            Ok(())
        })
        .on_exit(Player::Playing, |_| {
            println!("  [worker] speaker off");
            Ok(())
        })
        .transition(TransitionBuilder::new().from(Player::Stopped).on(Command::Play).to(Player::Active))?
        .transition(TransitionBuilder::new().from(Player::Playing).on(Command::Pause).to(Player::Paused))?
        .transition(TransitionBuilder::new().from(Player::Paused).on(Command::Play).to(Player::Playing))?
        .transition(TransitionBuilder::new().from(Player::Active).on(Command::Stop).to(Player::Stopped))?
        .transition(
            TransitionBuilder::new()
                .from(Player::Active)
                .on(Command::Seek)
                .when(|ctx| ctx.args().get::<u32>(0).is_some_and(|seconds| *seconds < 600))
                .action_with_result(|ctx| Ok(ctx.args().get::<u32>(0).copied().unwrap_or_default())),
        )?
        .build()?;

    let (context, pump) = delivery_loop();
    let player = ActiveStateMachine::spawn(
        tree,
        ActiveConfig::new().thread_name("media-player"),
        Some(Arc::new(context)),
    )?;
    player.subscribe(|notification| match notification {
        Notification::TransitionCompleted(completed) => {
            let position = completed
                .action_result
                .as_ref()
                .and_then(|result| result.downcast_ref::<u32>());
            match position {
                Some(seconds) => println!("  [main] seeked to {seconds}s, still {}", completed.state),
                None => println!("  [main] now {}", completed.state),
            }
        }
        Notification::TransitionDeclined(context) => {
            println!("  [main] {} declined in {}", context.event(), context.source())
        }
        Notification::ExceptionThrown(thrown) => println!("  [main] error: {}", thrown.error),
        Notification::BeginDispatch(_) => {}
    });

    player.initialize(Player::Stopped)?;
    println!("Initialized in {:?}\n", player.current_state());

    player.send(Command::Play)?;
    player.send(Command::Pause)?;
    player.send_with(Command::Seek, EventArgs::new().with(90u32))?;
    player.send_with(Command::Seek, EventArgs::new().with(4000u32))?;
    player.send_priority(Command::Stop)?;
    player.send_synchronously(Command::Play)?;

    println!("Worker finished; delivering notifications here:");
    let delivered = pump.run_pending();
    println!("\n{delivered} notifications delivered");
    println!("Final state: {:?}", player.current_state());

    player.dispose();
    Ok(())
}
