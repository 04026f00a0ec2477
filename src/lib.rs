/*!
  Decoder, encoder and disassembler for legacy ActionScript (AVM1) action bytecode.

  ```ignore
  let sequence = avm1_bytecode::decode(&[0x06, 0x00])?;
  assert_eq!(sequence[0].to_mnemonic_text(), "play");
  assert_eq!(avm1_bytecode::encode(&sequence)?, vec![0x06, 0x00]);
  ```
*/

#[macro_use] extern crate prettytable;
#[macro_use] extern crate lazy_static;

pub mod analysis;
pub mod bytecode;
pub mod error;

pub use bytecode::{
  decode, disassemble, encode, listing, ActionCode, Decoder, Descriptor, Instruction,
  InstructionSequence, OpcodeTable, Operands, PushValue
};
pub use error::{CodecError, OperandError, Result, TableError};
