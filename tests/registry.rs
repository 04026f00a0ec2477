//! The process-wide table freezes on first use, so this file holds a single test that owns the
//! whole process.

use avm1_bytecode::bytecode::{opcode, register, OperandLayout};
use avm1_bytecode::{decode, encode, Decoder, Descriptor, Operands, TableError};

#[test]
fn register_then_freeze() {
  let blit = Descriptor::new(0xA0, "vendorBlit", OperandLayout::Raw, Some(2), Some(0), 7);
  register(blit).unwrap();

  assert_eq!(
    register(Descriptor::new(0xA0, "vendorBlit2", OperandLayout::Raw, None, None, 7)),
    Err(TableError::DuplicateCode { code: 0xA0 })
  );
  assert_eq!(
    register(Descriptor::new(0x96, "myPush", OperandLayout::Raw, None, None, 7)),
    Err(TableError::DuplicateCode { code: 0x96 })
  );
  assert_eq!(
    register(Descriptor::new(0xA1, "stop", OperandLayout::Raw, None, None, 7)),
    Err(TableError::DuplicateMnemonic { mnemonic: "stop".to_string() })
  );
  assert_eq!(
    register(Descriptor::new(0x00, "halt", OperandLayout::None, None, None, 7)),
    Err(TableError::ReservedEndMarker)
  );

  // The first decode freezes the table with the extension in it.
  let bytes = [0xA0, 0x02, 0x00, 0x01, 0x02, 0x00];
  let mut decoder = Decoder::new();
  let sequence = decoder.decode(&bytes).unwrap();
  assert!(decoder.diagnostics().is_empty());
  assert!(!sequence[0].is_opaque());
  assert_eq!(sequence[0].mnemonic(), "vendorBlit");
  assert_eq!(sequence[0].operands(), &Operands::Raw { bytes: vec![0x01, 0x02] });
  assert_eq!(sequence[0].stack_effect(), (Some(2), Some(0)));
  assert_eq!(encode(&sequence).unwrap(), bytes.to_vec());

  assert_eq!(opcode::lookup_by_mnemonic("vendorBlit").unwrap().code, 0xA0);
  assert_eq!(
    register(Descriptor::new(0xA2, "late", OperandLayout::Raw, None, None, 7)),
    Err(TableError::Frozen { code: 0xA2 })
  );
  assert!(decode(&[0xA2, 0x00, 0x00, 0x00]).unwrap()[0].is_opaque());
}
