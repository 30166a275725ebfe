use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use sysdeck::cache::Invalidator;
use sysdeck::error::ControlError;
use sysdeck::system::control::ProcessControl;

fn spawn_long_lived_child() -> Child {
    Command::new("sh")
        .args(["-c", "sleep 30"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn child process")
}

fn wait_for_exit(child: &mut Child, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => return,
            Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(50)),
            Ok(None) => {
                let _ = child.kill();
                panic!("child process did not exit before timeout");
            }
            Err(err) => {
                let _ = child.kill();
                panic!("failed waiting for child exit: {err}");
            }
        }
    }
}

fn control() -> (ProcessControl, Invalidator) {
    let invalidator = Invalidator::default();
    let cores = thread::available_parallelism().map_or(1, |n| n.get());
    (ProcessControl::new(cores, invalidator.clone()), invalidator)
}

#[test]
fn signal_to_nonexistent_pid_is_not_found() {
    let (control, invalidator) = control();
    let result = control.send_signal(i32::MAX as u32, 15);
    assert!(matches!(result, Err(ControlError::NotFound(_))));
    assert_eq!(invalidator.requested(), 1);
}

#[test]
fn sigterm_terminates_spawned_child() {
    let (control, invalidator) = control();
    let mut child = spawn_long_lived_child();
    let pid = child.id();

    if let Err(err) = control.send_signal(pid, 15) {
        let _ = child.kill();
        panic!("send_signal reported failure: {err}");
    }
    wait_for_exit(&mut child, Duration::from_secs(5));
    assert_eq!(invalidator.requested(), 1);
}

#[test]
fn empty_core_set_leaves_scheduler_untouched() {
    let (control, invalidator) = control();
    let mut child = spawn_long_lived_child();
    let pid = child.id();

    let before = control.affinity(pid).expect("read affinity");
    let result = control.bind_affinity(pid, &[]);
    let after = control.affinity(pid).expect("read affinity");
    let _ = child.kill();
    let _ = child.wait();

    assert!(matches!(result, Err(ControlError::InvalidRequest(_))));
    assert_eq!(before, after);
    assert_eq!(invalidator.requested(), 0);
}

#[test]
fn bind_child_to_single_core() {
    let (control, invalidator) = control();
    let mut child = spawn_long_lived_child();
    let pid = child.id();

    let allowed = control.affinity(pid).expect("read affinity");
    let Some(&core) = allowed.iter().find(|&&c| c < control.core_count()) else {
        let _ = child.kill();
        let _ = child.wait();
        return;
    };

    let result = control.bind_affinity(pid, &[core]);
    let after = control.affinity(pid);
    let _ = child.kill();
    let _ = child.wait();

    result.expect("bind to an already-allowed core");
    assert_eq!(after.expect("read affinity"), vec![core]);
    assert_eq!(invalidator.requested(), 1);
}

#[test]
fn lower_priority_of_own_child() {
    let (control, _) = control();
    let mut child = spawn_long_lived_child();
    let pid = child.id();

    let result = control.set_priority(pid, 10);
    let _ = child.kill();
    let _ = child.wait();
    result.expect("raise nice value");
}
