//! Demo of the arbitration flow against the echo device driver.
//!
//! Starts the manager, injects a fake received message, requests one packet
//! transmission and a short carrier test, and prints every status
//! notification along the way.

use embassy_executor::{Executor, Spawner};
use embassy_time::{Duration, Timer};
use log::{log, Level};

use aprs_radio_control::device_driver_echo::EchoRxQueue;
use aprs_radio_control::{
    ArbiterConfiguration, DecodedMessage, DeviceDriver, Event, RadioControlManager, TransmissionRequest, WaveformSynthesizer,
};

#[embassy_executor::task]
async fn demo_task(spawner: Spawner) {
    let rx_queue: &'static EchoRxQueue = Box::leak(Box::new(EchoRxQueue::new()));
    let driver = DeviceDriver::with(rx_queue.receiver());
    let synthesizer = WaveformSynthesizer::with();

    let mut manager = RadioControlManager::new();
    if let Err(error) = manager.initialize(ArbiterConfiguration::default(), spawner, driver, synthesizer) {
        log!(Level::Error, "Initialization failed: {:?}", error);
        return;
    }

    // A message "received" while the radio is listening.
    rx_queue.sender().send(DecodedMessage::new("VE2AAA>APRS:demo position report")).await;
    Timer::after(Duration::from_millis(100)).await;

    if let Err(error) = manager.submit(TransmissionRequest::new("DEMO DE VE2FPD", 10, 4, 0)) {
        log!(Level::Error, "Submit failed: {:?}", error);
        return;
    }

    if let Err(error) = manager.submit(TransmissionRequest::new_carrier(0)) {
        log!(Level::Error, "Carrier submit failed: {:?}", error);
        return;
    }

    loop {
        match manager.next_event().await {
            Ok(Event::AprsMessage(message)) => {
                log!(Level::Info, "Demo saw received message: {}", message.as_text());
            }
            Ok(event) => {
                log!(Level::Info, "Demo saw {} ({:?})", event.kind_name(), event);
            }
            Err(error) => {
                log!(Level::Error, "Event stream failed: {:?}", error);
                return;
            }
        }
    }
}

fn main() {
    env_logger::builder().filter_level(log::LevelFilter::Info).init();
    let executor: &'static mut Executor = Box::leak(Box::new(Executor::new()));
    executor.run(|spawner| {
        spawner.spawn(demo_task(spawner)).ok();
    });
}
