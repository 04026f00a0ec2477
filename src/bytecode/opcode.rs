/*!
  The opcode table maps an action code to its descriptor: mnemonic, stack effect, and the shape
  of its inline operands. The built-in actions are enumerated by `ActionCode`, which leans on the
  `strum` and `num_enum` derives for byte and text conversion exactly as the VM opcode enum does.

  A process-wide table is built lazily from the built-ins plus anything handed to `register`.
  The first lookup freezes it; from then on it is read-only and shared without locking.
*/

use std::collections::HashMap;
use std::convert::TryFrom;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

use bimap::BiMap;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use string_cache::DefaultAtom;
use strum::IntoEnumIterator;
use strum_macros::{Display as StrumDisplay, EnumIter, EnumString, IntoStaticStr};

use crate::error::{CodecError, Result, TableError};

/// Opcodes at or above this value are followed by a 16 bit operand length.
pub const OPERAND_THRESHOLD: u8 = 0x80;
/// The zero opcode terminates a top-level action block.
pub const END_OF_ACTIONS: u8 = 0x00;

/**
  The built-in legacy action set. Discriminants are the action codes as they appear on the wire.
  The mnemonic of each action is its `strum` serialization.
*/
#[derive(
  StrumDisplay, IntoStaticStr, EnumString, EnumIter, TryFromPrimitive, IntoPrimitive,
  Clone,        Copy,          Eq,         PartialEq, Debug,           Hash
)]
#[strum(serialize_all = "camelCase")]
#[repr(u8)]
pub enum ActionCode {
  // Movie control, SWF 3 //
  NextFrame      = 0x04,
  PrevFrame      = 0x05,
  Play           = 0x06,
  Stop           = 0x07,
  ToggleQuality  = 0x08,
  StopSounds     = 0x09,

  // Stack arithmetic and strings, SWF 4 //
  Add            = 0x0A,
  Subtract       = 0x0B,
  Multiply       = 0x0C,
  Divide         = 0x0D,
  Equals         = 0x0E,
  Less           = 0x0F,
  And            = 0x10,
  Or             = 0x11,
  Not            = 0x12,
  StringEquals   = 0x13,
  StringLength   = 0x14,
  StringExtract  = 0x15,
  Pop            = 0x17,
  ToInteger      = 0x18,
  GetVariable    = 0x1C,
  SetVariable    = 0x1D,
  #[strum(serialize = "setTarget2")]
  SetTarget2     = 0x20,
  StringAdd      = 0x21,
  GetProperty    = 0x22,
  SetProperty    = 0x23,
  CloneSprite    = 0x24,
  RemoveSprite   = 0x25,
  Trace          = 0x26,
  StartDrag      = 0x27,
  EndDrag        = 0x28,
  StringLess     = 0x29,
  Throw          = 0x2A,
  CastOp         = 0x2B,
  ImplementsOp   = 0x2C,
  RandomNumber   = 0x30,
  #[strum(serialize = "mbStringLength")]
  MbStringLength = 0x31,
  CharToAscii    = 0x32,
  AsciiToChar    = 0x33,
  GetTime        = 0x34,
  #[strum(serialize = "mbStringExtract")]
  MbStringExtract = 0x35,
  #[strum(serialize = "mbCharToAscii")]
  MbCharToAscii  = 0x36,
  #[strum(serialize = "mbAsciiToChar")]
  MbAsciiToChar  = 0x37,

  // Objects and functions, SWF 5+ //
  Delete         = 0x3A,
  #[strum(serialize = "delete2")]
  Delete2        = 0x3B,
  DefineLocal    = 0x3C,
  CallFunction   = 0x3D,
  Return         = 0x3E,
  Modulo         = 0x3F,
  NewObject      = 0x40,
  #[strum(serialize = "defineLocal2")]
  DefineLocal2   = 0x41,
  InitArray      = 0x42,
  InitObject     = 0x43,
  TypeOf         = 0x44,
  TargetPath     = 0x45,
  Enumerate      = 0x46,
  #[strum(serialize = "add2")]
  Add2           = 0x47,
  #[strum(serialize = "less2")]
  Less2          = 0x48,
  #[strum(serialize = "equals2")]
  Equals2        = 0x49,
  ToNumber       = 0x4A,
  ToString       = 0x4B,
  PushDuplicate  = 0x4C,
  StackSwap      = 0x4D,
  GetMember      = 0x4E,
  SetMember      = 0x4F,
  Increment      = 0x50,
  Decrement      = 0x51,
  CallMethod     = 0x52,
  NewMethod      = 0x53,
  InstanceOf     = 0x54,
  #[strum(serialize = "enumerate2")]
  Enumerate2     = 0x55,
  BitAnd         = 0x60,
  BitOr          = 0x61,
  BitXor         = 0x62,
  #[strum(serialize = "bitLShift")]
  BitLShift      = 0x63,
  #[strum(serialize = "bitRShift")]
  BitRShift      = 0x64,
  #[strum(serialize = "bitURShift")]
  BitURShift     = 0x65,
  StrictEquals   = 0x66,
  Greater        = 0x67,
  StringGreater  = 0x68,
  Extends        = 0x69,

  // Actions with inline operands //
  GotoFrame      = 0x81,
  #[strum(serialize = "getURL")]
  GetUrl         = 0x83,
  StoreRegister  = 0x87,
  ConstantPool   = 0x88,
  WaitForFrame   = 0x8A,
  SetTarget      = 0x8B,
  GotoLabel      = 0x8C,
  #[strum(serialize = "waitForFrame2")]
  WaitForFrame2  = 0x8D,
  #[strum(serialize = "defineFunction2")]
  DefineFunction2 = 0x8E,
  Try            = 0x8F,
  With           = 0x94,
  Push           = 0x96,
  Jump           = 0x99,
  #[strum(serialize = "getURL2")]
  GetUrl2        = 0x9A,
  DefineFunction = 0x9B,
  If             = 0x9D,
  Call           = 0x9E,
  #[strum(serialize = "gotoFrame2")]
  GotoFrame2     = 0x9F,
}

/// The shape of the operand bytes that follow an action record's length prefix.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum OperandLayout {
  /// No operand bytes. Opcodes at or above the threshold still carry a zero length.
  None,
  GotoFrame,
  GetUrl,
  StoreRegister,
  ConstantPool,
  WaitForFrame,
  SetTarget,
  GotoLabel,
  WaitForFrame2,
  GetUrl2,
  GotoFrame2,
  Push,
  /// A signed 16 bit displacement.
  Branch,
  /// Header followed by one body.
  DefineFunction,
  DefineFunction2,
  With,
  /// Header followed by the try, catch and finally bodies.
  Try,
  /// Uninterpreted operand bytes, for custom opcodes.
  Raw,
}

impl OperandLayout {
  /// Container layouts own nested instruction sequences.
  pub fn is_container(&self) -> bool {
    matches!(
      self,
      OperandLayout::DefineFunction | OperandLayout::DefineFunction2 |
      OperandLayout::With | OperandLayout::Try
    )
  }
}

impl ActionCode {
  pub fn code(&self) -> u8 {
    Into::<u8>::into(*self)
  }

  pub fn mnemonic(&self) -> &'static str {
    self.into()
  }

  /// Values popped and pushed. `None` when the count depends on values on the stack.
  pub fn stack_effect(&self) -> (Option<u8>, Option<u8>) {
    use ActionCode::*;
    match self {
      NextFrame | PrevFrame | Play | Stop | ToggleQuality | StopSounds | EndDrag
      | GotoFrame | GetUrl | ConstantPool | WaitForFrame | SetTarget | GotoLabel
      | Try | Jump | StoreRegister                                   => (Some(0), Some(0)),

      Not | StringLength | ToInteger | GetVariable | RandomNumber | MbStringLength
      | CharToAscii | AsciiToChar | MbCharToAscii | MbAsciiToChar | Delete2
      | TypeOf | TargetPath | ToNumber | ToString | Increment | Decrement => (Some(1), Some(1)),

      Add | Subtract | Multiply | Divide | Equals | Less | And | Or | StringEquals
      | StringAdd | GetProperty | StringLess | CastOp | Delete | Modulo | Add2
      | Less2 | Equals2 | GetMember | InstanceOf | BitAnd | BitOr | BitXor
      | BitLShift | BitRShift | BitURShift | StrictEquals | Greater
      | StringGreater                                                => (Some(2), Some(1)),

      StringExtract | MbStringExtract                                => (Some(3), Some(1)),

      Pop | SetTarget2 | RemoveSprite | Trace | Throw | Return | DefineLocal2
      | With | If | Call | GotoFrame2 | WaitForFrame2                => (Some(1), Some(0)),

      SetVariable | DefineLocal | Extends | GetUrl2                   => (Some(2), Some(0)),
      SetProperty | CloneSprite | SetMember                          => (Some(3), Some(0)),
      GetTime                                                        => (Some(0), Some(1)),
      PushDuplicate                                                  => (Some(1), Some(2)),
      StackSwap                                                      => (Some(2), Some(2)),

      StartDrag | ImplementsOp                                       => (None, Some(0)),
      CallFunction | NewObject | InitArray | InitObject | CallMethod
      | NewMethod                                                    => (None, Some(1)),
      Enumerate | Enumerate2                                         => (Some(1), None),
      DefineFunction | DefineFunction2 | Push                        => (Some(0), None),
    }
  }

  pub fn layout(&self) -> OperandLayout {
    match self {
      ActionCode::GotoFrame       => OperandLayout::GotoFrame,
      ActionCode::GetUrl          => OperandLayout::GetUrl,
      ActionCode::StoreRegister   => OperandLayout::StoreRegister,
      ActionCode::ConstantPool    => OperandLayout::ConstantPool,
      ActionCode::WaitForFrame    => OperandLayout::WaitForFrame,
      ActionCode::SetTarget       => OperandLayout::SetTarget,
      ActionCode::GotoLabel       => OperandLayout::GotoLabel,
      ActionCode::WaitForFrame2   => OperandLayout::WaitForFrame2,
      ActionCode::DefineFunction2 => OperandLayout::DefineFunction2,
      ActionCode::Try             => OperandLayout::Try,
      ActionCode::With            => OperandLayout::With,
      ActionCode::Push            => OperandLayout::Push,
      ActionCode::Jump            => OperandLayout::Branch,
      ActionCode::If              => OperandLayout::Branch,
      ActionCode::GetUrl2         => OperandLayout::GetUrl2,
      ActionCode::DefineFunction  => OperandLayout::DefineFunction,
      ActionCode::GotoFrame2      => OperandLayout::GotoFrame2,
      _                           => OperandLayout::None
    }
  }

  /// The movie format version that introduced the action.
  pub fn since(&self) -> u8 {
    use ActionCode::*;
    match self {
      NextFrame | PrevFrame | Play | Stop | ToggleQuality | StopSounds | GotoFrame
      | GetUrl | WaitForFrame | SetTarget | GotoLabel => 3,

      InstanceOf | Enumerate2 | StrictEquals | Greater | StringGreater => 6,

      DefineFunction2 | Extends | CastOp | ImplementsOp | Try | Throw => 7,

      other if other.code() < Delete.code() => 4,
      Jump | If | Call | GetUrl2 | GotoFrame2 | WaitForFrame2 | Push => 4,
      _ => 5
    }
  }
}

/// Immutable description of one opcode.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Descriptor {
  pub code: u8,
  pub mnemonic: DefaultAtom,
  pub pop_count: Option<u8>,
  pub push_count: Option<u8>,
  pub has_inline_operands: bool,
  pub layout: OperandLayout,
  pub since: u8,
}

impl Descriptor {
  pub fn new(
    code: u8,
    mnemonic: &str,
    layout: OperandLayout,
    pop_count: Option<u8>,
    push_count: Option<u8>,
    since: u8
  ) -> Descriptor {
    Descriptor {
      code,
      mnemonic: DefaultAtom::from(mnemonic),
      pop_count,
      push_count,
      has_inline_operands: code >= OPERAND_THRESHOLD,
      layout,
      since
    }
  }

  fn validate(&self) -> std::result::Result<(), TableError> {
    if self.code == END_OF_ACTIONS {
      return Err(TableError::ReservedEndMarker);
    }
    if !self.has_inline_operands && self.layout != OperandLayout::None {
      return Err(TableError::OperandsBelowThreshold { code: self.code });
    }
    Ok(())
  }
}

impl From<ActionCode> for Descriptor {
  fn from(action: ActionCode) -> Descriptor {
    let (pop_count, push_count) = action.stack_effect();
    Descriptor::new(
      action.code(),
      action.mnemonic(),
      action.layout(),
      pop_count,
      push_count,
      action.since()
    )
  }
}

/**
  A set of descriptors keyed by code, with the code <-> mnemonic relation held as a bijection so
  that neither a code nor a mnemonic can be registered twice.
*/
#[derive(Clone, Debug)]
pub struct OpcodeTable {
  descriptors: HashMap<u8, Descriptor>,
  mnemonics: BiMap<u8, DefaultAtom>,
}

impl OpcodeTable {
  pub fn empty() -> OpcodeTable {
    OpcodeTable {
      descriptors: HashMap::new(),
      mnemonics: BiMap::new()
    }
  }

  /// A table holding every `ActionCode`.
  pub fn builtin() -> OpcodeTable {
    let mut table = OpcodeTable::empty();
    for action in ActionCode::iter() {
      let descriptor = Descriptor::from(action);
      table.mnemonics.insert(descriptor.code, descriptor.mnemonic.clone());
      table.descriptors.insert(descriptor.code, descriptor);
    }
    table
  }

  /// The built-in table extended with custom descriptors.
  pub fn with_extensions<I>(extensions: I) -> std::result::Result<OpcodeTable, TableError>
    where I: IntoIterator<Item = Descriptor>
  {
    let mut table = OpcodeTable::builtin();
    for descriptor in extensions {
      table.insert(descriptor)?;
    }
    Ok(table)
  }

  pub fn insert(&mut self, descriptor: Descriptor) -> std::result::Result<(), TableError> {
    descriptor.validate()?;
    if self.mnemonics.contains_left(&descriptor.code) {
      return Err(TableError::DuplicateCode { code: descriptor.code });
    }
    if self.mnemonics.contains_right(&descriptor.mnemonic) {
      return Err(TableError::DuplicateMnemonic { mnemonic: descriptor.mnemonic.to_string() });
    }
    self.mnemonics.insert(descriptor.code, descriptor.mnemonic.clone());
    self.descriptors.insert(descriptor.code, descriptor);
    Ok(())
  }

  pub fn lookup(&self, code: u8) -> Result<&Descriptor> {
    self.descriptors.get(&code).ok_or(CodecError::UnknownOpcode { code, offset: None })
  }

  pub fn lookup_by_mnemonic(&self, name: &str) -> Result<&Descriptor> {
    self.mnemonics
        .get_by_right(&DefaultAtom::from(name))
        .and_then(|code| self.descriptors.get(code))
        .ok_or_else(|| CodecError::UnknownMnemonic { name: name.to_string() })
  }

  pub fn contains(&self, code: u8) -> bool {
    self.descriptors.contains_key(&code)
  }

  pub fn len(&self) -> usize {
    self.descriptors.len()
  }

  pub fn is_empty(&self) -> bool {
    self.descriptors.is_empty()
  }

  /// Descriptors in ascending code order.
  pub fn iter(&self) -> std::vec::IntoIter<&Descriptor> {
    let mut descriptors: Vec<&Descriptor> = self.descriptors.values().collect();
    descriptors.sort_by_key(|descriptor| descriptor.code);
    descriptors.into_iter()
  }
}

// region Process-wide table

struct Registry {
  frozen: bool,
  extensions: Vec<Descriptor>,
}

lazy_static! {
  static ref REGISTRY: Mutex<Registry> = Mutex::new(Registry { frozen: false, extensions: vec![] });
  static ref GLOBAL_TABLE: OpcodeTable = freeze_registry();
}

fn freeze_registry() -> OpcodeTable {
  let mut registry = REGISTRY.lock().unwrap_or_else(PoisonError::into_inner);
  registry.frozen = true;

  let mut table = OpcodeTable::builtin();
  for descriptor in registry.extensions.drain(..) {
    let code = descriptor.code;
    if let Err(error) = table.insert(descriptor) {
      tracing::warn!(code, %error, "dropping custom opcode");
    }
  }
  tracing::debug!(opcodes = table.len(), "opcode table frozen");
  table
}

/**
  Adds a custom descriptor to the process-wide table. Must happen before the first call to
  `table`, `lookup` or `lookup_by_mnemonic`, or to anything that decodes or encodes through the
  global table.
*/
pub fn register(descriptor: Descriptor) -> std::result::Result<(), TableError> {
  descriptor.validate()?;
  let mut registry = REGISTRY.lock().unwrap_or_else(PoisonError::into_inner);
  if registry.frozen {
    return Err(TableError::Frozen { code: descriptor.code });
  }

  let builtin_code = ActionCode::try_from(descriptor.code).is_ok();
  if builtin_code || registry.extensions.iter().any(|d| d.code == descriptor.code) {
    return Err(TableError::DuplicateCode { code: descriptor.code });
  }
  let builtin_name = ActionCode::from_str(&descriptor.mnemonic).is_ok();
  if builtin_name || registry.extensions.iter().any(|d| d.mnemonic == descriptor.mnemonic) {
    return Err(TableError::DuplicateMnemonic { mnemonic: descriptor.mnemonic.to_string() });
  }

  registry.extensions.push(descriptor);
  Ok(())
}

/// The frozen process-wide table.
pub fn table() -> &'static OpcodeTable {
  &GLOBAL_TABLE
}

pub fn lookup(code: u8) -> Result<&'static Descriptor> {
  table().lookup(code)
}

pub fn lookup_by_mnemonic(name: &str) -> Result<&'static Descriptor> {
  table().lookup_by_mnemonic(name)
}

// endregion

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn play_is_registered() {
    let descriptor = lookup(0x06).unwrap();
    assert_eq!(&*descriptor.mnemonic, "play");
    assert_eq!(descriptor.pop_count, Some(0));
    assert_eq!(descriptor.push_count, Some(0));
    assert!(!descriptor.has_inline_operands);
  }

  #[test]
  fn mnemonics_round_trip_through_the_table() {
    let table = OpcodeTable::builtin();
    for descriptor in table.iter() {
      let by_name = table.lookup_by_mnemonic(&descriptor.mnemonic).unwrap();
      assert_eq!(by_name.code, descriptor.code);
    }
    assert_eq!(table.len(), ActionCode::iter().count());
  }

  #[test]
  fn unknown_code_and_name() {
    let table = OpcodeTable::builtin();
    assert_eq!(table.lookup(0x01), Err(CodecError::UnknownOpcode { code: 0x01, offset: None }));
    assert!(matches!(
      table.lookup_by_mnemonic("fly"),
      Err(CodecError::UnknownMnemonic { .. })
    ));
  }

  #[test]
  fn selected_mnemonics() {
    assert_eq!(ActionCode::GetUrl2.mnemonic(), "getURL2");
    assert_eq!(ActionCode::BitURShift.mnemonic(), "bitURShift");
    assert_eq!(ActionCode::PrevFrame.mnemonic(), "prevFrame");
    assert_eq!(ActionCode::If.mnemonic(), "if");
    assert_eq!(ActionCode::from_str("defineFunction2"), Ok(ActionCode::DefineFunction2));
  }

  #[test]
  fn layouts_respect_the_threshold() {
    for action in ActionCode::iter() {
      if action.layout() != OperandLayout::None {
        assert!(action.code() >= OPERAND_THRESHOLD, "{}", action);
      }
    }
  }

  #[test]
  fn versions() {
    assert_eq!(ActionCode::Play.since(), 3);
    assert_eq!(ActionCode::Add.since(), 4);
    assert_eq!(ActionCode::Push.since(), 4);
    assert_eq!(ActionCode::CallFunction.since(), 5);
    assert_eq!(ActionCode::StrictEquals.since(), 6);
    assert_eq!(ActionCode::Try.since(), 7);
  }

  #[test]
  fn local_extension() {
    let custom = Descriptor::new(0xA0, "vendorBlit", OperandLayout::Raw, Some(2), Some(0), 7);
    let table = OpcodeTable::with_extensions(vec![custom]).unwrap();
    assert_eq!(table.lookup_by_mnemonic("vendorBlit").unwrap().code, 0xA0);

    let clash = Descriptor::new(0xA1, "play", OperandLayout::Raw, None, None, 7);
    assert_eq!(
      OpcodeTable::with_extensions(vec![clash]).unwrap_err(),
      TableError::DuplicateMnemonic { mnemonic: "play".to_string() }
    );

    let low = Descriptor::new(0x70, "lowRaw", OperandLayout::Raw, None, None, 7);
    assert_eq!(
      OpcodeTable::with_extensions(vec![low]).unwrap_err(),
      TableError::OperandsBelowThreshold { code: 0x70 }
    );
  }
}
