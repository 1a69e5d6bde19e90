use std::{
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::RecvTimeoutError,
        Arc,
    },
    thread,
    time::Duration,
};

use gyroglove::{
    config::Config, constants::FINGER_NAMES, log_error, log_print,
    service::{serial::frame_queue, session::SessionController}, utility::available_port_names,
};

// Reads the glove without sending any input and prints every frame.
// Usage: telegram-monitor [port] [baud_rate]
fn main() {
    env_logger::init();

    let mut config = Config::default();
    config.load();

    let mut session_config = config.session_config();

    let mut args = std::env::args().skip(1);

    if let Some(port) = args.next() {
        session_config.port = port;
    }

    if let Some(baud_rate) = args.next() {
        match baud_rate.parse::<u32>() {
            Ok(baud_rate) => session_config.baud_rate = baud_rate,
            Err(_) => log_error!(
                "`{}` is not a baud rate, using {}",
                baud_rate,
                session_config.baud_rate
            ),
        }
    }

    println!("Available ports: {:?}", available_port_names());

    let (tx, rx) = frame_queue();
    let mut sessions = SessionController::default();

    if let Err(e) = sessions.start_calibration(&session_config, tx) {
        log_error!("{}", e);

        return;
    }

    println!("Reading `{}`, press Enter to stop.", session_config.port);

    let quit = Arc::new(AtomicBool::new(false));

    {
        let quit = quit.clone();

        thread::spawn(move || {
            let mut line = String::new();

            io::stdin().read_line(&mut line).ok();

            quit.store(true, Ordering::Release);
        });
    }

    while !quit.load(Ordering::Acquire) {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(frame) => {
                let fingers: Vec<String> = frame
                    .channels
                    .iter()
                    .enumerate()
                    .map(|(i, channel)| {
                        format!(
                            "{}={:>4} {:>3}%{}",
                            FINGER_NAMES[i],
                            channel.raw,
                            channel.percentage,
                            if channel.pressed { "*" } else { " " }
                        )
                    })
                    .collect();

                log_print!("{}", fingers.join(" | "));
            }
            Err(RecvTimeoutError::Timeout) => (),
            Err(RecvTimeoutError::Disconnected) => {
                log_error!("The session ended");

                break;
            }
        }
    }

    sessions.stop_calibration();
}
