use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Device refused the compiled binary artifact.
    #[snafu(display("device rejected program binary: {reason}"))]
    ProgramRejected { reason: String },

    /// The entry point does not exist in the loaded program.
    #[snafu(display("entry point '{entry}' not found"))]
    EntryPointNotFound { entry: String },

    /// The kernel faulted during execution.
    #[snafu(display("dispatch fault: {reason}"))]
    DispatchFault { reason: String },
}
