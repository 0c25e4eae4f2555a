pub mod assembler;
pub mod assembly;
pub mod dialect;
pub mod line;
pub mod result;
pub mod section;
pub mod seed;
pub mod statement;

pub use assembly::{AssemblyFile, StructureMode};
pub use dialect::Dialect;
pub use line::Line;
pub use result::{Error, Result};
pub use section::{
    DataSegment, FunctionSection, PaddingReport, PointerWidth, STACK_ALIGNMENT, Section, SectionKind,
    SkipReason,
};
pub use statement::StatementLine;
