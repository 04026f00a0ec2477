/*!
  Advisory checks over decoded action blocks.

  Stack effects in the opcode table are metadata, not a contract the player enforces, so nothing
  here rejects input. `check_stack` follows the control flow of every sequence in the tree,
  tracking how many values each path leaves on the stack, and reports where a path may pop more
  than it pushed or where two paths meet at different depths. Each body is checked on its own,
  starting from an empty stack. An instruction whose counts depend on runtime values ends the walk
  along that path.
*/

use std::collections::VecDeque;
use std::fmt::{Display, Formatter};

use crate::bytecode::{ActionCode, Instruction, InstructionSequence, OperandLayout};

/**
  Where an instruction sits in the tree: its index in the top-level block, then for each level
  of nesting the body number and the index within that body. `[3, 0, 1]` is instruction 1 of the
  first body of instruction 3.
*/
pub type Path = Vec<usize>;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StackIssue {
  /// The instruction pops more values than the path leading to it pushed.
  Underflow { path: Path, depth: usize, pops: usize },
  /// Two paths reach the instruction with different stack depths.
  Mismatch { path: Path, expected: usize, found: usize },
}

impl StackIssue {
  pub fn path(&self) -> &[usize] {
    match self {
      StackIssue::Underflow { path, .. } => path,
      StackIssue::Mismatch { path, .. } => path
    }
  }
}

fn dotted(path: &[usize]) -> String {
  path.iter().map(|index| index.to_string()).collect::<Vec<String>>().join(".")
}

impl Display for StackIssue {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      StackIssue::Underflow { path, depth, pops } => {
        write!(f, "{}: pops {} with {} on the stack", dotted(path), pops, depth)
      }
      StackIssue::Mismatch { path, expected, found } => {
        write!(f, "{}: reached with stack depth {} and {}", dotted(path), expected, found)
      }
    }
  }
}

/// Checks every sequence in the tree. Issues come out grouped by sequence, outermost first.
pub fn check_stack(sequence: &InstructionSequence) -> Vec<StackIssue> {
  let mut issues = vec![];
  check_sequence(sequence, &[], &mut issues);
  issues
}

fn check_sequence(sequence: &InstructionSequence, prefix: &[usize], issues: &mut Vec<StackIssue>) {
  let path_to = |index: usize| -> Path {
    let mut path = prefix.to_vec();
    path.push(index);
    path
  };

  // depths[len] is the end of the sequence.
  let mut depths: Vec<Option<usize>> = vec![None; sequence.len() + 1];
  let mut worklist = VecDeque::new();
  if !sequence.is_empty() {
    depths[0] = Some(0);
    worklist.push_back(0);
  }

  while let Some(index) = worklist.pop_front() {
    let depth = match depths[index] {
      Some(depth) => depth,
      None => continue
    };
    let instruction = &sequence[index];

    let (pops, pushes) = match instruction.stack_effect() {
      (Some(pops), Some(pushes)) => (pops, pushes),
      _ => continue
    };
    if pops > depth {
      issues.push(StackIssue::Underflow { path: path_to(index), depth, pops });
    }
    let after = depth.saturating_sub(pops) + pushes;

    for next in successors(instruction, index) {
      if next >= depths.len() {
        continue;
      }
      match depths[next] {
        None => {
          depths[next] = Some(after);
          if next < sequence.len() {
            worklist.push_back(next);
          }
        }
        Some(expected) if expected != after && next < sequence.len() => {
          issues.push(StackIssue::Mismatch { path: path_to(next), expected, found: after });
        }
        Some(_) => {}
      }
    }
  }

  for (index, instruction) in sequence.iter().enumerate() {
    for (body_number, body) in instruction.operands().bodies().into_iter().enumerate() {
      let mut body_prefix = path_to(index);
      body_prefix.push(body_number);
      check_sequence(body, &body_prefix, issues);
    }
  }
}

/// Control leaves through the branch target of any action with branch operands. Only `jump` is
/// known to skip its fall-through, so other branch actions, registered ones included, take both.
fn successors(instruction: &Instruction, index: usize) -> Vec<usize> {
  let code = instruction.opcode();
  if code == ActionCode::Return as u8 || code == ActionCode::Throw as u8 {
    return vec![];
  }
  let branches = instruction.descriptor()
                            .map_or(false, |descriptor| descriptor.layout == OperandLayout::Branch);
  match (branches, instruction.branch_target()) {
    (true, Some(target)) if code == ActionCode::Jump as u8 => vec![target],
    (true, Some(target))                                    => vec![index + 1, target],
    _                                                       => vec![index + 1]
  }
}

/// The lowest movie format version that knows every action in the tree. `None` when the tree
/// holds no instruction with a descriptor.
pub fn required_version(sequence: &InstructionSequence) -> Option<u8> {
  sequence.iter()
          .flat_map(|instruction| {
            let own = instruction.descriptor().map(|descriptor| descriptor.since);
            let nested = instruction.operands()
                                    .bodies()
                                    .into_iter()
                                    .filter_map(required_version)
                                    .max();
            own.into_iter().chain(nested)
          })
          .max()
}
