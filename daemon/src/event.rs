use crate::console::Command;

pub enum DaemonEvent {
    /// The target game process appeared in the process list.
    TargetStarted,
    /// The target game process exited.
    TargetStopped,
    /// A trigger arrived from the console.
    Command(Command),
    /// Ctrl+C received, or the console asked to quit.
    Shutdown,
}
