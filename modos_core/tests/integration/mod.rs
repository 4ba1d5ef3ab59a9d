mod harness;

mod clock_sync;
mod rendezvous;
mod separation;
mod shutdown;
