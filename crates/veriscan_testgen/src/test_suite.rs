//! Test suites.

use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::test_case::TestCase;
use crate::xml;

/// An ordered, deduplicated collection of test cases.
///
/// Order is emission order: engines push cases as paths terminate, and
/// readers see them in the same order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestSuite {
    test_cases: Vec<TestCase>,
}

impl TestSuite {
    /// Create an empty suite.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a test case unless a structurally equal one is present.
    ///
    /// Returns whether the case was appended.
    pub fn push(&mut self, test_case: TestCase) -> bool {
        if self.test_cases.contains(&test_case) {
            return false;
        }
        self.test_cases.push(test_case);
        true
    }

    /// The collected test cases in emission order.
    pub fn test_cases(&self) -> &[TestCase] {
        &self.test_cases
    }

    /// The number of collected test cases.
    pub fn len(&self) -> usize {
        self.test_cases.len()
    }

    /// Whether the suite is empty.
    pub fn is_empty(&self) -> bool {
        self.test_cases.is_empty()
    }

    /// Write the suite as one XML file per test case into `directory`,
    /// creating it if necessary. Files are named `test_case_<i>.xml` in
    /// emission order.
    pub fn write_xml(&self, directory: &Path) -> Result {
        fs::create_dir_all(directory)?;
        for (index, test_case) in self.test_cases.iter().enumerate() {
            let rendered = xml::to_xml_string(test_case)?;
            fs::write(directory.join(format!("test_case_{}.xml", index)), rendered)?;
        }
        Ok(())
    }

    /// Read every `test_case_<i>.xml` under `directory` back into a suite.
    pub fn read_xml(directory: &Path) -> Result<Self> {
        let mut suite = Self::new();
        let mut index = 0;
        loop {
            let path = directory.join(format!("test_case_{}.xml", index));
            if !path.exists() {
                break;
            }
            let text = fs::read_to_string(&path)?;
            suite.push(xml::from_xml_str(&text)?);
            index += 1;
        }
        Ok(suite)
    }
}

impl fmt::Display for TestSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, test_case) in self.test_cases.iter().enumerate() {
            writeln!(f, "test case {}:", index)?;
            write!(f, "{}", test_case)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_case::TestValue;

    #[test]
    fn push_deduplicates_structurally() {
        let mut suite = TestSuite::new();
        let mut case = TestCase::new();
        case.set_cycle_input(0, "P.x", TestValue::Bool(true));
        assert!(suite.push(case.clone()));
        assert!(!suite.push(case));
        assert_eq!(suite.len(), 1);
    }

    #[test]
    fn directory_round_trip() {
        let directory = tempfile::tempdir().unwrap();
        let mut suite = TestSuite::new();
        for flag in [true, false] {
            let mut case = TestCase::new();
            case.set_initial_state("P.c", TestValue::Int(0));
            case.set_cycle_input(0, "P.x", TestValue::Bool(flag));
            suite.push(case);
        }
        suite.write_xml(directory.path()).unwrap();
        let recovered = TestSuite::read_xml(directory.path()).unwrap();
        assert_eq!(suite, recovered);
    }
}
