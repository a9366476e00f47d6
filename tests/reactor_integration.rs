//! The reactor's registration methods take `&self` specifically so a
//! handler invoked mid-`tick` can register something new on the same
//! instance (an accept handler registering the fd it just accepted). These
//! tests drive that reentrant path directly, along with ordinary timer and
//! raw-fd dispatch.

use std::cell::Cell;
use std::os::unix::net::UnixStream;
use std::rc::Rc;
use std::time::Duration;

use taskmonitor::reactor::Reactor;

#[test]
fn a_one_shot_timer_fires_exactly_once() {
    let reactor = Reactor::new().unwrap();
    let fired = Rc::new(Cell::new(0));
    let fired_handler = fired.clone();

    reactor
        .register_one_shot_timer(Duration::from_millis(1), move || {
            fired_handler.set(fired_handler.get() + 1);
            false
        })
        .unwrap();

    std::thread::sleep(Duration::from_millis(20));
    reactor.tick(Some(Duration::from_millis(10))).unwrap();
    reactor.tick(Some(Duration::from_millis(10))).unwrap();

    assert_eq!(fired.get(), 1);
}

#[test]
fn a_handler_can_register_a_new_timer_on_the_same_reactor_mid_tick() {
    let reactor = Rc::new(Reactor::new().unwrap());
    let inner_fired = Rc::new(Cell::new(false));

    let reactor_for_outer = reactor.clone();
    let inner_fired_for_outer = inner_fired.clone();
    reactor
        .register_one_shot_timer(Duration::from_millis(1), move || {
            let inner_fired = inner_fired_for_outer.clone();
            reactor_for_outer
                .register_one_shot_timer(Duration::from_millis(1), move || {
                    inner_fired.set(true);
                    false
                })
                .unwrap();
            false
        })
        .unwrap();

    std::thread::sleep(Duration::from_millis(20));
    reactor.tick(Some(Duration::from_millis(10))).unwrap();
    std::thread::sleep(Duration::from_millis(20));
    reactor.tick(Some(Duration::from_millis(10))).unwrap();

    assert!(inner_fired.get(), "a timer registered from inside another timer's handler must still fire");
}

#[test]
fn a_raw_fd_handler_can_deregister_itself() {
    let reactor = Reactor::new().unwrap();
    let (mut writer, reader) = UnixStream::pair().unwrap();
    reader.set_nonblocking(true).unwrap();
    use std::os::fd::AsRawFd;
    let raw_fd = reader.as_raw_fd();

    let reads = Rc::new(Cell::new(0));
    let reads_for_handler = reads.clone();
    // Keep `reader` alive for the registration's lifetime by moving it into
    // the handler's captures, matching how `register_raw_fd` is used
    // throughout the rest of the crate.
    let token = reactor
        .register_raw_fd(raw_fd, move || {
            let mut buf = [0u8; 8];
            use std::io::Read;
            let _ = (&reader).read(&mut buf);
            reads_for_handler.set(reads_for_handler.get() + 1);
            false
        })
        .unwrap();

    use std::io::Write;
    writer.write_all(b"x").unwrap();
    reactor.tick(Some(Duration::from_millis(50))).unwrap();

    assert_eq!(reads.get(), 1);

    // A second tick must not re-invoke a handler that returned false.
    writer.write_all(b"y").unwrap();
    reactor.tick(Some(Duration::from_millis(10))).unwrap();
    assert_eq!(reads.get(), 1);

    // Deregistering an already-removed token is a harmless no-op.
    reactor.deregister(token);
}
