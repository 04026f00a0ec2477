/*!
  Human-readable renderings of an `InstructionSequence`.

  `disassemble` yields one line per instruction, lazily. A container's bodies are listed right
  after the container, indented one level per nesting depth, and numbered from zero within their
  own sequence, so that a branch's `-> N` always names a line at the same depth. `listing` builds
  the same walk into a table that also shows byte offsets and stack effects.
*/

use prettytable::{format as TableFormat, Table};

use crate::bytecode::instruction::{Instruction, InstructionSequence, Operands, PushValue};

const INDENT: usize = 4;

#[derive(Clone, Debug)]
struct Frame<'a> {
  instructions: &'a [Instruction],
  next: usize,
  depth: usize,
  /// Printed once before the first instruction. Only `try` bodies are labeled.
  label: Option<&'static str>,
}

/**
  A lazy iterator over the lines of a disassembly. Cloning it gives an independent iterator from
  the same position, so a fresh clone restarts the listing.
*/
#[derive(Clone, Debug)]
pub struct Disassembly<'a> {
  frames: Vec<Frame<'a>>,
  /// The most recent constant pool seen, for annotating `push` operands.
  constants: Option<&'a [String]>,
}

impl<'a> Disassembly<'a> {
  pub fn new(sequence: &'a InstructionSequence) -> Disassembly<'a> {
    Disassembly {
      frames: vec![Frame { instructions: sequence.as_slice(), next: 0, depth: 0, label: None }],
      constants: None
    }
  }

  fn render(&mut self, instruction: &'a Instruction) -> String {
    if let Operands::ConstantPool { constants } = instruction.operands() {
      self.constants = Some(constants.as_slice());
    }

    let text = instruction.to_mnemonic_text();
    match (instruction.operands(), self.constants) {
      (Operands::Push { values }, Some(constants)) => {
        let notes = constant_notes(values, constants);
        match notes.is_empty() {
          true  => text,
          false => format!("{}  ; {}", text, notes.join(", "))
        }
      }
      _ => text
    }
  }
}

impl<'a> Iterator for Disassembly<'a> {
  type Item = String;

  fn next(&mut self) -> Option<String> {
    loop {
      let frame = self.frames.last_mut()?;

      if let Some(label) = frame.label.take() {
        let indent = (frame.depth - 1) * INDENT;
        return Some(format!("{:indent$}{}:", "", label, indent = indent));
      }

      if frame.next >= frame.instructions.len() {
        self.frames.pop();
        continue;
      }

      let index = frame.next;
      let depth = frame.depth;
      let instructions = frame.instructions;
      let instruction = &instructions[index];
      frame.next += 1;

      let text = self.render(instruction);
      push_bodies(&mut self.frames, instruction, depth + 1);

      return Some(format!("{:indent$}{:>4}  {}", "", index, text, indent = depth * INDENT));
    }
  }
}

/// Stacks the bodies of a container so that they come out in wire order.
fn push_bodies<'a>(frames: &mut Vec<Frame<'a>>, instruction: &'a Instruction, depth: usize) {
  let labels: &[&'static str] = match instruction.operands() {
    Operands::Try(_) => &["try", "catch", "finally"],
    _ => &[]
  };
  let bodies = instruction.operands().bodies();
  for (position, body) in bodies.into_iter().enumerate().rev() {
    frames.push(Frame {
      instructions: body.as_slice(),
      next: 0,
      depth,
      label: labels.get(position).copied()
    });
  }
}

fn constant_notes(values: &[PushValue], constants: &[String]) -> Vec<String> {
  values.iter()
        .filter_map(|value| {
          let index = value.constant_index()?;
          let constant = constants.get(index)?;
          Some(format!("{} = {:?}", value, constant))
        })
        .collect()
}

/// Renders `sequence` one line per instruction. See `Disassembly`.
pub fn disassemble(sequence: &InstructionSequence) -> Disassembly<'_> {
  Disassembly::new(sequence)
}

lazy_static! {
  static ref LISTING_FORMAT: TableFormat::TableFormat =
    TableFormat::FormatBuilder::new()
      .column_separator('│')
      .borders(' ')
      .separator(
        TableFormat::LinePosition::Title,
        TableFormat::LineSeparator::new('─', '┼', ' ', ' ')
      )
      .separator(
        TableFormat::LinePosition::Bottom,
        TableFormat::LineSeparator::new('─', '┴', ' ', ' ')
      )
      .padding(1, 1)
      .build();
}

/**
  A table with one row per instruction: decode offset, index path (`3.0.1` is instruction 1 of
  the first body of instruction 0 of the first body of instruction 3), the instruction text and
  its stack effect as `pops/pushes`, with `?` for counts that depend on runtime values.
*/
pub fn listing(sequence: &InstructionSequence) -> Table {
  let mut table = Table::new();
  table.set_format(*LISTING_FORMAT);
  table.set_titles(row![ubr->"Offset", ubr->"Index", ubl->"Instruction", ubc->"Stack"]);
  add_rows(&mut table, sequence, "", 0);
  table
}

fn add_rows(table: &mut Table, sequence: &InstructionSequence, prefix: &str, depth: usize) {
  for (index, instruction) in sequence.iter().enumerate() {
    let path = format!("{}{}", prefix, index);
    let offset = match instruction.offset() {
      Some(offset) => format!("0x{:04X}", offset),
      None => "-".to_string()
    };
    let (pops, pushes) = instruction.stack_effect();
    let count = |value: Option<usize>| value.map_or("?".to_string(), |value| value.to_string());
    let text = format!("{:indent$}{}", "", instruction, indent = depth * 2);

    table.add_row(row![r->offset, r->path, text, c->format!("{}/{}", count(pops), count(pushes))]);

    for (position, body) in instruction.operands().bodies().into_iter().enumerate() {
      let prefix = format!("{}.{}.", path, position);
      add_rows(table, body, &prefix, depth + 1);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bytecode::decoder::decode;
  use crate::bytecode::instruction::{CatchTarget, Function, TryBlock};
  use crate::bytecode::opcode::ActionCode;

  #[test]
  fn backward_branch_names_its_line() {
    // play; jump -6 (back over itself and `play`); end
    let sequence = decode(&[0x06, 0x99, 0x02, 0x00, 0xFA, 0xFF, 0x00]).unwrap();
    let lines: Vec<String> = disassemble(&sequence).collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], "   0  play");
    assert!(lines[1].ends_with("-> 0"), "{}", lines[1]);
  }

  #[test]
  fn restartable() {
    let sequence = InstructionSequence::from(vec![
      Instruction::new(ActionCode::Play),
      Instruction::new(ActionCode::Stop),
    ]);
    let mut lines = disassemble(&sequence);
    let fresh = lines.clone();
    assert_eq!(lines.next().as_deref(), Some("   0  play"));
    assert_eq!(fresh.count(), 2);
    assert_eq!(lines.count(), 1);
  }

  #[test]
  fn bodies_are_indented() {
    let function = Function {
      name: "f".to_string(),
      params: vec![],
      body: InstructionSequence::from(vec![Instruction::new(ActionCode::Return)])
    };
    let sequence = InstructionSequence::from(vec![
      Instruction::with_operands(ActionCode::DefineFunction, Operands::DefineFunction(Box::new(function))),
      Instruction::new(ActionCode::Stop),
    ]);
    let lines: Vec<String> = disassemble(&sequence).collect();
    assert_eq!(
      lines,
      vec![
        "   0  defineFunction \"f\" () body 1".to_string(),
        "       0  return".to_string(),
        "   1  stop".to_string(),
      ]
    );
  }

  #[test]
  fn try_bodies_are_labeled() {
    let block = TryBlock {
      catch_block: true,
      finally_block: false,
      reserved: 0,
      catch_target: CatchTarget::Register(1),
      try_body: InstructionSequence::from(vec![Instruction::new(ActionCode::Throw)]),
      catch_body: InstructionSequence::from(vec![Instruction::new(ActionCode::Pop)]),
      finally_body: InstructionSequence::new(),
    };
    let sequence = InstructionSequence::from(vec![
      Instruction::with_operands(ActionCode::Try, Operands::Try(Box::new(block))),
    ]);
    let lines: Vec<String> = disassemble(&sequence).collect();
    assert_eq!(
      lines,
      vec![
        "   0  try catch r1 try 1 catch 1 finally 0".to_string(),
        "try:".to_string(),
        "       0  throw".to_string(),
        "catch:".to_string(),
        "       0  pop".to_string(),
        "finally:".to_string(),
      ]
    );
  }

  #[test]
  fn constant_pool_annotations() {
    let sequence = InstructionSequence::from(vec![
      Instruction::with_operands(
        ActionCode::ConstantPool,
        Operands::ConstantPool { constants: vec!["x".to_string(), "y".to_string()] }
      ),
      Instruction::push(vec![PushValue::Constant8(1), PushValue::Int(2), PushValue::Constant8(9)]),
    ]);
    let lines: Vec<String> = disassemble(&sequence).collect();
    assert_eq!(lines[1], "   1  push c:1 2 c:9  ; c:1 = \"y\"");
  }

  #[test]
  fn listing_has_a_row_per_instruction() {
    let sequence = decode(&[0x06, 0x96, 0x02, 0x00, 0x04, 0x01, 0x00]).unwrap();
    let table = listing(&sequence);
    assert_eq!(table.len(), 2);
    let text = table.to_string();
    assert!(text.contains("0x0001"));
    assert!(text.contains("push r1"));
    assert!(text.contains("0/1"));
  }
}
