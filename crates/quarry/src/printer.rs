/// Controls what the commands print to standard streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Printer {
    /// Print the normal output.
    Default,
    /// Suppress all output.
    Quiet,
    /// Print everything, including debug messages.
    Verbose,
}

impl Printer {
    pub(crate) fn is_quiet(self) -> bool {
        matches!(self, Self::Quiet)
    }
}
