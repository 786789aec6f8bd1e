//! Relay lifecycle management (stop, status).

use relay_config_and_utils::{Config, Paths};
use std::path::Path;
use tokio::time::{sleep, Duration};

/// Pid recorded in `path`, if it holds a positive integer.
pub(crate) fn read_pid(path: &Path) -> Option<i32> {
    let content = std::fs::read_to_string(path).ok()?;
    content.trim().parse::<i32>().ok().filter(|pid| *pid > 0)
}

/// Whether a process with `pid` exists.
pub(crate) fn process_alive(pid: i32) -> bool {
    // SAFETY: signal 0 performs the existence and permission check only.
    let result = unsafe { libc::kill(pid, 0) };
    result == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Stop the relay.
pub async fn stop_relay(paths: &Paths) -> Result<(), Box<dyn std::error::Error>> {
    let pid_path = paths.pid_file();

    let Some(pid) = read_pid(&pid_path) else {
        println!("Relay is not running (PID file not found)");
        return Ok(());
    };

    if !process_alive(pid) {
        println!("Relay is not running (stale PID file)");
        let _ = std::fs::remove_file(&pid_path);
        return Ok(());
    }

    // SAFETY: pid is positive and names a live process.
    unsafe {
        libc::kill(pid, libc::SIGTERM);
    }
    println!("Relay shutdown initiated");

    // Wait for relay to stop (up to 5 seconds)
    for _ in 0..50 {
        sleep(Duration::from_millis(100)).await;
        if !process_alive(pid) {
            let _ = std::fs::remove_file(&pid_path);
            println!("Relay stopped");
            return Ok(());
        }
    }

    println!(
        "Relay did not stop gracefully, sending SIGKILL to PID {}",
        pid
    );
    // SAFETY: as above.
    unsafe {
        libc::kill(pid, libc::SIGKILL);
    }
    let _ = std::fs::remove_file(&pid_path);
    println!("Relay killed");

    Ok(())
}

/// Check relay status.
pub fn check_status(config: &Config, paths: &Paths) {
    match read_pid(&paths.pid_file()) {
        Some(pid) if process_alive(pid) => {
            println!("Relay is running");
            println!("  PID:     {}", pid);
        }
        Some(pid) => println!("Relay is not running (stale PID file for {})", pid),
        None => println!("Relay is not running (PID file not found)"),
    }

    println!("  Sockets: {}", config.socket_dir.display());
    for shard in 0..config.shard_count {
        let path = Paths::shard_socket_file(&config.socket_dir, shard);
        let state = if path.exists() { "present" } else { "missing" };
        println!("  Shard {}: {} ({})", shard, state, path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_pid_accepts_only_positive_integers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.pid");

        assert_eq!(read_pid(&path), None);
        for (content, expected) in [
            ("4242\n", Some(4242)),
            ("  17 ", Some(17)),
            ("0", None),
            ("-1", None),
            ("not a pid", None),
        ] {
            std::fs::write(&path, content).unwrap();
            assert_eq!(read_pid(&path), expected, "{:?}", content);
        }
    }

    #[test]
    fn current_process_is_alive() {
        assert!(process_alive(std::process::id() as i32));
    }

    #[tokio::test]
    async fn stop_without_pid_file_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        stop_relay(&paths).await.unwrap();
        assert!(!paths.pid_file().exists());
    }
}
