//! Traffic Light State Machine
//!
//! This example demonstrates a cyclic passive state machine with a composite
//! "operating" state and a flashing override.
//!
//! Key concepts:
//! - Cyclic state transitions driven by a single `Timer` event
//! - A superstate handling `Fault` for every colour
//! - Deep history returning to the exact colour after a fault clears
//! - Entry handlers and notification subscribers
//!
//! Run with: cargo run --example traffic_light

use statecraft::builder::{simple_transition, StateMachineBuilder};
use statecraft::core::HistoryType;
use statecraft::identifier_enum;
use statecraft::notify::Notification;
use statecraft::passive::PassiveStateMachine;

identifier_enum! {
    enum Light {
        Operating,
        Red,
        Green,
        Yellow,
        Flashing,
    }
}

identifier_enum! {
    enum Signal {
        Timer,
        Fault,
        Clear,
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Traffic Light State Machine ===\n");

    let mut builder = StateMachineBuilder::new()
        .substates(
            Light::Operating,
            [Light::Red, Light::Green, Light::Yellow],
            Light::Red,
            HistoryType::Deep,
        )
        .transitions([
            simple_transition(Light::Red, Signal::Timer, Light::Green),
            simple_transition(Light::Green, Signal::Timer, Light::Yellow),
            simple_transition(Light::Yellow, Signal::Timer, Light::Red),
            simple_transition(Light::Operating, Signal::Fault, Light::Flashing),
            simple_transition(Light::Flashing, Signal::Clear, Light::Operating),
        ]);
    for light in [Light::Red, Light::Green, Light::Yellow, Light::Flashing] {
        builder = builder.on_entry(light, |light| {
            println!("  lamp: {light}");
            Ok(())
        });
    }
    let tree = builder.build()?;

    let mut machine = PassiveStateMachine::new(tree);
    machine.subscribe(|notification| {
        if let Notification::TransitionDeclined(context) = notification {
            println!("  ignored {} while {}", context.event(), context.source());
        }
    });

    println!("Initializing:");
    machine.initialize(Light::Operating)?;

    println!("\nCycling:");
    for _ in 0..4 {
        machine.send(Signal::Timer)?;
    }

    println!("\nFault while {:?}:", machine.current_state());
    machine.send(Signal::Fault)?;
    machine.send(Signal::Timer)?;

    println!("\nFault cleared:");
    machine.send(Signal::Clear)?;
    println!("\nBack to {:?}", machine.current_state());

    Ok(())
}
