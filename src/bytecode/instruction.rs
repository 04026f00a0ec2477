use std::borrow::Cow;
use std::fmt::{Display, Formatter};
use std::iter::FromIterator;
use std::ops::Index;

use crate::bytecode::opcode::{self, ActionCode, Descriptor, OperandLayout};
use crate::bytecode::operands::{self, DecodedOperands};
use crate::error::{CodecError, OperandError, Result};

/**
  A value pushed by the `push` action. Floating point values compare by their bits, so `NaN`
  equals itself and `0.0` differs from `-0.0`, the same as their encodings.
*/
#[derive(Clone, Debug)]
pub enum PushValue {
  Str(String),
  Float(f32),
  Null,
  Undefined,
  Register(u8),
  Bool(bool),
  /// Stored on the wire as two little-endian words, high word first.
  Double(f64),
  Int(i32),
  /// Index into the active constant pool, 8 bit form.
  Constant8(u8),
  /// Index into the active constant pool, 16 bit form.
  Constant16(u16),
}

impl PushValue {
  pub fn constant_index(&self) -> Option<usize> {
    match self {
      PushValue::Constant8(index) => Some(*index as usize),
      PushValue::Constant16(index) => Some(*index as usize),
      _ => None
    }
  }
}

impl PartialEq for PushValue {
  fn eq(&self, other: &PushValue) -> bool {
    match (self, other) {
      (PushValue::Str(a), PushValue::Str(b))               => a == b,
      (PushValue::Float(a), PushValue::Float(b))           => a.to_bits() == b.to_bits(),
      (PushValue::Null, PushValue::Null)                   => true,
      (PushValue::Undefined, PushValue::Undefined)         => true,
      (PushValue::Register(a), PushValue::Register(b))     => a == b,
      (PushValue::Bool(a), PushValue::Bool(b))             => a == b,
      (PushValue::Double(a), PushValue::Double(b))         => a.to_bits() == b.to_bits(),
      (PushValue::Int(a), PushValue::Int(b))               => a == b,
      (PushValue::Constant8(a), PushValue::Constant8(b))   => a == b,
      (PushValue::Constant16(a), PushValue::Constant16(b)) => a == b,
      _                                                    => false
    }
  }
}

impl Display for PushValue {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      PushValue::Str(text)          => write!(f, "{:?}", text),
      PushValue::Float(value)       => write!(f, "{:?}f", value),
      PushValue::Null               => write!(f, "null"),
      PushValue::Undefined          => write!(f, "undefined"),
      PushValue::Register(register) => write!(f, "r{}", register),
      PushValue::Bool(value)        => write!(f, "{}", value),
      PushValue::Double(value)      => write!(f, "{:?}", value),
      PushValue::Int(value)         => write!(f, "{}", value),
      PushValue::Constant8(index)   => write!(f, "c:{}", index),
      PushValue::Constant16(index)  => write!(f, "c16:{}", index),
    }
  }
}

/// `defineFunction`: parameters are named, the body follows the action record.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Function {
  pub name: String,
  pub params: Vec<String>,
  pub body: InstructionSequence,
}

/// A `defineFunction2` parameter. Register 0 means the parameter lives in a named variable.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct RegisterParam {
  pub register: u8,
  pub name: String,
}

/// `defineFunction2`: register-allocated parameters and preload flags.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Function2 {
  pub name: String,
  pub register_count: u8,
  pub flags: u16,
  pub params: Vec<RegisterParam>,
  pub body: InstructionSequence,
}

impl Function2 {
  pub const PRELOAD_THIS: u16       = 0x0001;
  pub const SUPPRESS_THIS: u16      = 0x0002;
  pub const PRELOAD_ARGUMENTS: u16  = 0x0004;
  pub const SUPPRESS_ARGUMENTS: u16 = 0x0008;
  pub const PRELOAD_SUPER: u16      = 0x0010;
  pub const SUPPRESS_SUPER: u16     = 0x0020;
  pub const PRELOAD_ROOT: u16       = 0x0040;
  pub const PRELOAD_PARENT: u16     = 0x0080;
  pub const PRELOAD_GLOBAL: u16     = 0x0100;

  pub fn has_flag(&self, flag: u16) -> bool {
    self.flags & flag == flag
  }
}

/// Where a `try` block stores the thrown value.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum CatchTarget {
  Name(String),
  Register(u8),
}

#[derive(Clone, Debug, PartialEq)]
pub struct TryBlock {
  pub catch_block: bool,
  pub finally_block: bool,
  /// The five high bits of the flag byte.
  pub reserved: u8,
  pub catch_target: CatchTarget,
  pub try_body: InstructionSequence,
  pub catch_body: InstructionSequence,
  pub finally_body: InstructionSequence,
}

/**
  The operand data of an action, one variant per operand layout. Flag bytes keep their reserved
  bits so that decoding then encoding reproduces the input exactly.
*/
#[derive(Clone, Debug, PartialEq)]
pub enum Operands {
  None,
  GotoFrame { frame: u16 },
  GetUrl { url: String, target: String },
  StoreRegister { register: u8 },
  ConstantPool { constants: Vec<String> },
  WaitForFrame { frame: u16, skip_count: u8 },
  SetTarget { target: String },
  GotoLabel { label: String },
  WaitForFrame2 { skip_count: u8 },
  /// Bits 7-6 hold the send method, bit 1 the load-target flag, bit 0 the load-variables flag.
  GetUrl2 { flags: u8 },
  /// `reserved` holds the six high bits of the flag byte.
  GotoFrame2 { play: bool, reserved: u8, scene_bias: Option<u16> },
  Push { values: Vec<PushValue> },
  /// Index of the target instruction in the owning sequence. The sequence length targets the
  /// end of the sequence.
  Branch { target: usize },
  DefineFunction(Box<Function>),
  DefineFunction2(Box<Function2>),
  With { body: InstructionSequence },
  Try(Box<TryBlock>),
  /// Operand bytes kept verbatim: unknown opcodes, custom opcodes, malformed operands.
  Raw { bytes: Vec<u8> },
}

impl Operands {
  /// Default operands for a layout, for building instructions by mnemonic.
  pub fn empty_for(layout: OperandLayout) -> Operands {
    match layout {
      OperandLayout::None            => Operands::None,
      OperandLayout::GotoFrame       => Operands::GotoFrame { frame: 0 },
      OperandLayout::GetUrl          => Operands::GetUrl { url: String::new(), target: String::new() },
      OperandLayout::StoreRegister   => Operands::StoreRegister { register: 0 },
      OperandLayout::ConstantPool    => Operands::ConstantPool { constants: vec![] },
      OperandLayout::WaitForFrame    => Operands::WaitForFrame { frame: 0, skip_count: 0 },
      OperandLayout::SetTarget       => Operands::SetTarget { target: String::new() },
      OperandLayout::GotoLabel       => Operands::GotoLabel { label: String::new() },
      OperandLayout::WaitForFrame2   => Operands::WaitForFrame2 { skip_count: 0 },
      OperandLayout::GetUrl2         => Operands::GetUrl2 { flags: 0 },
      OperandLayout::GotoFrame2      => Operands::GotoFrame2 { play: false, reserved: 0, scene_bias: None },
      OperandLayout::Push            => Operands::Push { values: vec![] },
      OperandLayout::Branch          => Operands::Branch { target: 0 },
      OperandLayout::DefineFunction  => Operands::DefineFunction(Box::new(Function::default())),
      OperandLayout::DefineFunction2 => Operands::DefineFunction2(Box::new(Function2::default())),
      OperandLayout::With            => Operands::With { body: InstructionSequence::new() },
      OperandLayout::Try             => Operands::Try(Box::new(TryBlock {
        catch_block: false,
        finally_block: false,
        reserved: 0,
        catch_target: CatchTarget::Name(String::new()),
        try_body: InstructionSequence::new(),
        catch_body: InstructionSequence::new(),
        finally_body: InstructionSequence::new(),
      })),
      OperandLayout::Raw             => Operands::Raw { bytes: vec![] },
    }
  }

  /// The layout these operands encode to. Raw bytes fit every layout.
  pub fn layout(&self) -> OperandLayout {
    match self {
      Operands::None                 => OperandLayout::None,
      Operands::GotoFrame { .. }     => OperandLayout::GotoFrame,
      Operands::GetUrl { .. }        => OperandLayout::GetUrl,
      Operands::StoreRegister { .. } => OperandLayout::StoreRegister,
      Operands::ConstantPool { .. }  => OperandLayout::ConstantPool,
      Operands::WaitForFrame { .. }  => OperandLayout::WaitForFrame,
      Operands::SetTarget { .. }     => OperandLayout::SetTarget,
      Operands::GotoLabel { .. }     => OperandLayout::GotoLabel,
      Operands::WaitForFrame2 { .. } => OperandLayout::WaitForFrame2,
      Operands::GetUrl2 { .. }       => OperandLayout::GetUrl2,
      Operands::GotoFrame2 { .. }    => OperandLayout::GotoFrame2,
      Operands::Push { .. }          => OperandLayout::Push,
      Operands::Branch { .. }        => OperandLayout::Branch,
      Operands::DefineFunction(_)    => OperandLayout::DefineFunction,
      Operands::DefineFunction2(_)   => OperandLayout::DefineFunction2,
      Operands::With { .. }          => OperandLayout::With,
      Operands::Try(_)               => OperandLayout::Try,
      Operands::Raw { .. }           => OperandLayout::Raw,
    }
  }

  fn fits(&self, layout: OperandLayout) -> bool {
    match self {
      Operands::Raw { .. } => true,
      other => other.layout() == layout
    }
  }

  /// Nested sequences in wire order.
  pub fn bodies(&self) -> Vec<&InstructionSequence> {
    match self {
      Operands::DefineFunction(function)  => vec![&function.body],
      Operands::DefineFunction2(function) => vec![&function.body],
      Operands::With { body }             => vec![body],
      Operands::Try(block)                => vec![&block.try_body, &block.catch_body, &block.finally_body],
      _                                   => vec![]
    }
  }

  pub fn bodies_mut(&mut self) -> Vec<&mut InstructionSequence> {
    match self {
      Operands::DefineFunction(function)  => vec![&mut function.body],
      Operands::DefineFunction2(function) => vec![&mut function.body],
      Operands::With { body }             => vec![body],
      Operands::Try(block) => {
        let TryBlock { try_body, catch_body, finally_body, .. } = &mut **block;
        vec![try_body, catch_body, finally_body]
      }
      _ => vec![]
    }
  }
}

/**
  One action: its descriptor (absent for opcodes the table does not know), the byte offset it was
  decoded from, and its operands. The offset is advisory once the owning sequence is edited and
  takes no part in equality.
*/
#[derive(Clone, Debug)]
pub struct Instruction {
  code: u8,
  descriptor: Option<Descriptor>,
  offset: Option<usize>,
  operands: Operands,
}

impl PartialEq for Instruction {
  fn eq(&self, other: &Instruction) -> bool {
    self.code == other.code && self.operands == other.operands
  }
}

impl Instruction {
  /// An action without operands.
  pub fn new(action: ActionCode) -> Instruction {
    Instruction::with_operands(action, Operands::None)
  }

  pub fn with_operands(action: ActionCode, operands: Operands) -> Instruction {
    Instruction::from_descriptor(Descriptor::from(action), operands)
  }

  pub fn from_descriptor(descriptor: Descriptor, operands: Operands) -> Instruction {
    Instruction {
      code: descriptor.code,
      descriptor: Some(descriptor),
      offset: None,
      operands
    }
  }

  /// Looks the mnemonic up in the process-wide table and fills in default operands.
  pub fn from_mnemonic(name: &str) -> Result<Instruction> {
    let descriptor = opcode::lookup_by_mnemonic(name)?;
    Ok(Instruction::from_descriptor(descriptor.clone(), Operands::empty_for(descriptor.layout)))
  }

  /// An action the table does not know, carried as its raw operand bytes.
  pub fn opaque(code: u8, bytes: Vec<u8>) -> Instruction {
    Instruction {
      code,
      descriptor: None,
      offset: None,
      operands: Operands::Raw { bytes }
    }
  }

  pub fn branch(action: ActionCode, target: usize) -> Instruction {
    Instruction::with_operands(action, Operands::Branch { target })
  }

  pub fn push(values: Vec<PushValue>) -> Instruction {
    Instruction::with_operands(ActionCode::Push, Operands::Push { values })
  }

  pub(crate) fn decoded(
    code: u8,
    descriptor: Option<Descriptor>,
    offset: usize,
    operands: Operands
  ) -> Instruction {
    Instruction { code, descriptor, offset: Some(offset), operands }
  }

  pub fn opcode(&self) -> u8 {
    self.code
  }

  pub fn descriptor(&self) -> Option<&Descriptor> {
    self.descriptor.as_ref()
  }

  pub fn is_opaque(&self) -> bool {
    self.descriptor.is_none()
  }

  pub fn mnemonic(&self) -> Cow<'_, str> {
    match &self.descriptor {
      Some(descriptor) => Cow::Borrowed(&*descriptor.mnemonic),
      None => Cow::Owned(format!("unknown_0x{:02X}", self.code))
    }
  }

  pub fn offset(&self) -> Option<usize> {
    self.offset
  }

  pub fn operands(&self) -> &Operands {
    &self.operands
  }

  pub fn operands_mut(&mut self) -> &mut Operands {
    &mut self.operands
  }

  pub fn branch_target(&self) -> Option<usize> {
    match self.operands {
      Operands::Branch { target } => Some(target),
      _ => None
    }
  }

  pub fn set_branch_target(&mut self, index: usize) {
    if let Operands::Branch { target } = &mut self.operands {
      *target = index;
    }
  }

  /**
    Values popped and pushed. The descriptor's counts are refined from the operands where the
    operands decide them: `push` pushes one value per operand, and an anonymous function
    definition pushes the function. `None` is an unknown count.
  */
  pub fn stack_effect(&self) -> (Option<usize>, Option<usize>) {
    match &self.operands {
      Operands::Push { values } => (Some(0), Some(values.len())),
      Operands::DefineFunction(function) => (Some(0), Some(function.name.is_empty() as usize)),
      Operands::DefineFunction2(function) => (Some(0), Some(function.name.is_empty() as usize)),
      _ => match &self.descriptor {
        Some(descriptor) => (
          descriptor.pop_count.map(usize::from),
          descriptor.push_count.map(usize::from)
        ),
        None => (None, None)
      }
    }
  }

  /**
    Writes the operand field, without the opcode and length prefix. `body_sizes` are the encoded
    lengths of the nested sequences, in wire order. Branch displacements are written as zero;
    the encoder patches them once the sequence layout is known.
  */
  pub fn encode_operands(&self, out: &mut Vec<u8>, body_sizes: &[usize]) -> Result<()> {
    if let Some(descriptor) = &self.descriptor {
      if !self.operands.fits(descriptor.layout) {
        return Err(CodecError::MalformedOperands {
          code: self.code,
          offset: self.offset,
          reason: OperandError::LayoutMismatch
        });
      }
    }
    operands::encode(self.code, &self.operands, body_sizes, out)
  }

  /**
    Parses an operand field for `descriptor`. Container bodies come back empty along with their
    declared byte sizes; branch targets come back as the raw displacement.
  */
  pub fn decode_operands(
    bytes: &[u8],
    descriptor: &Descriptor
  ) -> std::result::Result<DecodedOperands, OperandError> {
    operands::decode(descriptor.layout, bytes)
  }

  pub fn to_mnemonic_text(&self) -> String {
    let mnemonic = self.mnemonic();
    match &self.operands {
      Operands::None => mnemonic.into_owned(),

      Operands::GotoFrame { frame } => format!("{} {}", mnemonic, frame),

      Operands::GetUrl { url, target } => format!("{} {:?} {:?}", mnemonic, url, target),

      Operands::StoreRegister { register } => format!("{} r{}", mnemonic, register),

      Operands::ConstantPool { constants } => {
        let mut text = mnemonic.into_owned();
        for constant in constants {
          text.push_str(&format!(" {:?}", constant));
        }
        text
      }

      Operands::WaitForFrame { frame, skip_count } => {
        format!("{} {} skip {}", mnemonic, frame, skip_count)
      }

      Operands::SetTarget { target } => format!("{} {:?}", mnemonic, target),

      Operands::GotoLabel { label } => format!("{} {:?}", mnemonic, label),

      Operands::WaitForFrame2 { skip_count } => format!("{} skip {}", mnemonic, skip_count),

      Operands::GetUrl2 { flags } => format!("{} 0x{:02X}", mnemonic, flags),

      Operands::GotoFrame2 { play, scene_bias, .. } => {
        let action = if *play { "play" } else { "stop" };
        match scene_bias {
          Some(bias) => format!("{} {} bias {}", mnemonic, action, bias),
          None => format!("{} {}", mnemonic, action)
        }
      }

      Operands::Push { values } => {
        let mut text = mnemonic.into_owned();
        for value in values {
          text.push_str(&format!(" {}", value));
        }
        text
      }

      Operands::Branch { target } => format!("{} -> {}", mnemonic, target),

      Operands::DefineFunction(function) => {
        format!(
          "{} {:?} ({}) body {}",
          mnemonic,
          function.name,
          function.params
                  .iter()
                  .map(|param| format!("{:?}", param))
                  .collect::<Vec<String>>()
                  .join(", "),
          function.body.len()
        )
      }

      Operands::DefineFunction2(function) => {
        format!(
          "{} {:?} ({}) regs {} flags 0x{:04X} body {}",
          mnemonic,
          function.name,
          function.params
                  .iter()
                  .map(|param| match param.register {
                    0 => format!("{:?}", param.name),
                    register => format!("r{}:{:?}", register, param.name)
                  })
                  .collect::<Vec<String>>()
                  .join(", "),
          function.register_count,
          function.flags,
          function.body.len()
        )
      }

      Operands::With { body } => format!("{} body {}", mnemonic, body.len()),

      Operands::Try(block) => {
        let target = match &block.catch_target {
          CatchTarget::Name(name) => format!("{:?}", name),
          CatchTarget::Register(register) => format!("r{}", register)
        };
        format!(
          "{} catch {} try {} catch {} finally {}",
          mnemonic,
          target,
          block.try_body.len(),
          block.catch_body.len(),
          block.finally_body.len()
        )
      }

      Operands::Raw { bytes } => {
        let hex = bytes.iter().map(|byte| format!("{:02X}", byte)).collect::<Vec<String>>();
        format!("{} [{}]", mnemonic, hex.join(" "))
      }
    }
  }
}

impl Display for Instruction {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.to_mnemonic_text())
  }
}

/**
  The ordered actions of one block. Branch targets are indices into this sequence, so the
  structural edits below re-index every branch to keep it on the same target instruction.
*/
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InstructionSequence {
  instructions: Vec<Instruction>,
}

impl InstructionSequence {
  pub fn new() -> InstructionSequence {
    InstructionSequence { instructions: vec![] }
  }

  pub fn len(&self) -> usize {
    self.instructions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.instructions.is_empty()
  }

  pub fn get(&self, index: usize) -> Option<&Instruction> {
    self.instructions.get(index)
  }

  pub fn get_mut(&mut self, index: usize) -> Option<&mut Instruction> {
    self.instructions.get_mut(index)
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Instruction> {
    self.instructions.iter()
  }

  pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Instruction> {
    self.instructions.iter_mut()
  }

  pub fn as_slice(&self) -> &[Instruction] {
    &self.instructions
  }

  pub fn push(&mut self, instruction: Instruction) {
    self.instructions.push(instruction);
  }

  /**
    Inserts before `index`. Existing branches that target `index` or later move with their
    target. The inserted instruction's own branch target is taken as already expressed in the
    new layout.
  */
  pub fn insert(&mut self, index: usize, instruction: Instruction) {
    for existing in self.instructions.iter_mut() {
      if let Some(target) = existing.branch_target() {
        if target >= index {
          existing.set_branch_target(target + 1);
        }
      }
    }
    self.instructions.insert(index, instruction);
  }

  /// Removes the instruction at `index`. Branches that targeted it now target its successor.
  pub fn remove(&mut self, index: usize) -> Instruction {
    let removed = self.instructions.remove(index);
    for existing in self.instructions.iter_mut() {
      if let Some(target) = existing.branch_target() {
        if target > index {
          existing.set_branch_target(target - 1);
        }
      }
    }
    removed
  }

  pub fn into_vec(self) -> Vec<Instruction> {
    self.instructions
  }
}

impl From<Vec<Instruction>> for InstructionSequence {
  fn from(instructions: Vec<Instruction>) -> InstructionSequence {
    InstructionSequence { instructions }
  }
}

impl FromIterator<Instruction> for InstructionSequence {
  fn from_iter<I: IntoIterator<Item = Instruction>>(iter: I) -> InstructionSequence {
    InstructionSequence { instructions: iter.into_iter().collect() }
  }
}

impl Index<usize> for InstructionSequence {
  type Output = Instruction;

  fn index(&self, index: usize) -> &Instruction {
    &self.instructions[index]
  }
}

impl<'a> IntoIterator for &'a InstructionSequence {
  type Item = &'a Instruction;
  type IntoIter = std::slice::Iter<'a, Instruction>;

  fn into_iter(self) -> Self::IntoIter {
    self.instructions.iter()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn mnemonic_text() {
    assert_eq!(Instruction::new(ActionCode::Play).to_mnemonic_text(), "play");
    assert_eq!(Instruction::branch(ActionCode::If, 4).to_mnemonic_text(), "if -> 4");
    assert_eq!(
      Instruction::push(vec![
        PushValue::Str("x".to_string()),
        PushValue::Int(3),
        PushValue::Double(1.5),
        PushValue::Register(2),
        PushValue::Constant8(0),
      ]).to_mnemonic_text(),
      "push \"x\" 3 1.5 r2 c:0"
    );
    assert_eq!(Instruction::opaque(0xA5, vec![1, 0xFF]).to_mnemonic_text(), "unknown_0xA5 [01 FF]");
  }

  #[test]
  fn stack_effects() {
    assert_eq!(Instruction::new(ActionCode::Add).stack_effect(), (Some(2), Some(1)));
    assert_eq!(Instruction::new(ActionCode::CallFunction).stack_effect(), (None, Some(1)));
    let push = Instruction::push(vec![PushValue::Null, PushValue::Undefined]);
    assert_eq!(push.stack_effect(), (Some(0), Some(2)));
    assert_eq!(Instruction::opaque(0xA5, vec![]).stack_effect(), (None, None));
  }

  #[test]
  fn insert_keeps_branch_identity() {
    let mut sequence = InstructionSequence::from(vec![
      Instruction::new(ActionCode::Play),
      Instruction::new(ActionCode::Stop),
      Instruction::branch(ActionCode::Jump, 1),
      Instruction::branch(ActionCode::If, 4),
    ]);
    sequence.insert(1, Instruction::new(ActionCode::NextFrame));

    assert_eq!(sequence[3].branch_target(), Some(2));
    assert_eq!(sequence[2].opcode(), ActionCode::Stop.code());
    // The end of the sequence moved too.
    assert_eq!(sequence[4].branch_target(), Some(5));
  }

  #[test]
  fn remove_retargets_to_successor() {
    let mut sequence = InstructionSequence::from(vec![
      Instruction::branch(ActionCode::Jump, 2),
      Instruction::new(ActionCode::Play),
      Instruction::new(ActionCode::Stop),
    ]);
    sequence.remove(1);
    assert_eq!(sequence[0].branch_target(), Some(1));
    assert_eq!(sequence[1].opcode(), ActionCode::Stop.code());
  }

  #[test]
  fn equality_ignores_offsets() {
    let decoded = Instruction::decoded(0x06, Some(Descriptor::from(ActionCode::Play)), 12, Operands::None);
    assert_eq!(decoded, Instruction::new(ActionCode::Play));
  }

  #[test]
  fn floats_compare_by_bits() {
    assert_eq!(PushValue::Double(f64::NAN), PushValue::Double(f64::NAN));
    assert_eq!(PushValue::Float(f32::NAN), PushValue::Float(f32::NAN));
    assert_ne!(PushValue::Double(0.0), PushValue::Double(-0.0));
    assert_ne!(PushValue::Float(0.0), PushValue::Float(-0.0));
    assert_ne!(PushValue::Int(1), PushValue::Register(1));
  }

  #[test]
  fn built_by_mnemonic() {
    let instruction = Instruction::from_mnemonic("gotoFrame").unwrap();
    assert_eq!(instruction.opcode(), 0x81);
    assert_eq!(instruction.operands(), &Operands::GotoFrame { frame: 0 });
    assert!(matches!(
      Instruction::from_mnemonic("teleport"),
      Err(CodecError::UnknownMnemonic { .. })
    ));
  }

  #[test]
  fn layout_mismatch_is_rejected() {
    let instruction = Instruction::with_operands(ActionCode::GotoFrame, Operands::Branch { target: 0 });
    let mut out = vec![];
    assert!(matches!(
      instruction.encode_operands(&mut out, &[]),
      Err(CodecError::MalformedOperands { code: 0x81, .. })
    ));
  }
}
