pub mod contract;
pub mod execution;
pub mod note;
pub mod tx;

pub use contract::{
    AbiParameter, ContractArtifact, ContractClass, ContractInstance, FunctionArtifact,
    FunctionDebugMetadata, FunctionType, NodeInfo, ProtocolContractAddresses, PxeInfo,
    SourceCodeLocation,
};
pub use execution::{
    CircuitGateCount, ClientIvcProof, KernelPublicInputs, PrivateExecutionResult,
    PrivateSimulationResult, ProfileOutput, ProfileResult, ProvingOutput, PublicSimulationOutput,
    TxPhase, TxProvingResult, TxSimulationResult,
};
pub use note::{
    ExtendedNote, IncomingNotesFilter, Note, NoteStatus, OutgoingNotesFilter, UniqueNote,
};
pub use tx::{
    AuthWitness, BlockHeader, ExtendedUnencryptedL2Log, FunctionCall, GasFees,
    GetUnencryptedLogsResponse, InBlock, L2Block, LogFilter, LogId, MAX_NOTE_HASHES_PER_TX, Tx,
    TxContext, TxEffect, TxExecutionRequest, TxHash, TxReceipt, TxStatus, UnencryptedL2Log,
};
