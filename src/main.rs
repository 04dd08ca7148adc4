mod client;
mod config;
mod error;
mod extensions;
mod geometry;
mod hints;
mod keys;
mod layout;
mod render;
mod socket;
mod wm;

use env_logger::WriteStyle::Auto;

use wm::WindowManager;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::builder().format_timestamp(None).write_style(Auto).init();
    log::info!("starting logger OK");

    let mut manager = WindowManager::init().ok_or("could not connect to display server")?;
    log::info!("connected to display server OK");

    let tx = manager.take_socket_sender();
    match socket::ControlSocket::bind() {
        Ok(control_socket) => {
            manager.set_event_broadcaster(control_socket.subscribers());
            std::thread::spawn(move || control_socket.accept_loop(tx));
            log::info!("control socket listening at {}", socket::resolve_socket_path().display());
        }
        Err(e) => log::warn!("control socket unavailable: {}", e),
    }

    manager.run();

    log::info!("finished OK");
    Ok(())
}
