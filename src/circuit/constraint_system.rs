//! Constraint arena
//!
//! Variables are indices into an arena of BN254 assignments; constraints are
//! typed records over those indices. Public variables occupy the first
//! `num_public` slots in allocation order, which is also the order of the
//! public input vector handed to proof backends.

use ark_bn254::Fr;
use ark_ff::{PrimeField, Zero};
use num_bigint::BigUint;
use crate::circuit::{CircuitError, CircuitResult};
use crate::crypto::key_agreement::CurvePoint;
use crate::crypto::limbs::{field_to_be_bytes, field_to_biguint, field_to_limb, limbs_to_be_bytes, from_limbs, LIMB_BITS};
use crate::crypto::cipher::pow2;
use crate::crypto::poseidon::{PoseidonPermutation, POSEIDON_WIDTH};
use crate::crypto::{domains, CryptoUtils};

/// Index of an allocated variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(usize);

impl Var {
    /// Position in the assignment arena
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A secp256k1 point as coordinate limb variables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointVars {
    pub x: [Var; 4],
    pub y: [Var; 4],
}

/// Base of a scalar multiplication
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Base {
    Generator,
    Point(PointVars),
}

/// One 32-byte big-endian word of a hash preimage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Word {
    /// A field element written as 32 big-endian bytes
    Field(Var),
    /// Four 64-bit limbs, little-endian, written as one 256-bit integer
    Limbs([Var; 4]),
}

/// Typed constraints
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// `lhs == rhs`
    Equal { lhs: Var, rhs: Var },
    /// `Σ cᵢ·vᵢ + constant == out`
    Linear { terms: Vec<(Fr, Var)>, constant: Fr, out: Var },
    /// `a·b == out`
    Mul { a: Var, b: Var, out: Var },
    /// `var < 2^bits`
    Range { var: Var, bits: u32 },
    /// One column of a multi-limb product:
    /// `Σ aᵢ·bᵢ + carry_in == out + carry_out·2^64`
    ColumnProduct {
        terms: Vec<(Var, Var)>,
        carry_in: Option<Var>,
        out: Var,
        carry_out: Var,
    },
    /// Little-endian limbs read as an integer exceed `bound`
    GreaterThan { limbs: Vec<Var>, bound: u64 },
    /// `out == scalar·base` on secp256k1
    ScalarMul { scalar: [Var; 4], base: Base, out: PointVars },
    /// `output == Poseidon(input)`
    Permutation { input: [Var; POSEIDON_WIDTH], output: [Var; POSEIDON_WIDTH] },
    /// SHA-256 over the words, digest split into two 128-bit halves
    Sha256 { words: Vec<Word>, out: [Var; 2] },
}

/// Constraint with a human-readable label
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledConstraint {
    pub label: String,
    pub constraint: Constraint,
}

/// Arena of assignments and constraints
#[derive(Debug, Clone)]
pub struct ConstraintSystem {
    assignments: Vec<Fr>,
    num_public: usize,
    constraints: Vec<LabeledConstraint>,
    permutation: PoseidonPermutation,
    setup_mode: bool,
}

impl ConstraintSystem {
    /// Builder that records values
    pub fn new(permutation: PoseidonPermutation) -> Self {
        Self {
            assignments: Vec::new(),
            num_public: 0,
            constraints: Vec::new(),
            permutation,
            setup_mode: false,
        }
    }

    /// Builder that only records shape; value closures are never called
    pub fn new_setup(permutation: PoseidonPermutation) -> Self {
        Self {
            setup_mode: true,
            ..Self::new(permutation)
        }
    }

    /// Whether this system only carries shape
    pub fn is_setup_mode(&self) -> bool {
        self.setup_mode
    }

    /// Allocate a public variable. All public variables come first.
    pub fn alloc_public<F>(&mut self, label: &str, value: F) -> CircuitResult<Var>
    where
        F: FnOnce() -> CircuitResult<Fr>,
    {
        if self.assignments.len() != self.num_public {
            return Err(CircuitError::PublicAfterPrivate(label.to_string()));
        }
        let var = self.alloc(label, value)?;
        self.num_public += 1;
        Ok(var)
    }

    /// Allocate a private variable
    pub fn alloc<F>(&mut self, _label: &str, value: F) -> CircuitResult<Var>
    where
        F: FnOnce() -> CircuitResult<Fr>,
    {
        let assigned = if self.setup_mode { Fr::zero() } else { value()? };
        self.assignments.push(assigned);
        Ok(Var(self.assignments.len() - 1))
    }

    /// Allocate a variable pinned to a constant
    pub fn constant(&mut self, label: &str, value: Fr) -> CircuitResult<Var> {
        let var = self.alloc(label, || Ok(value))?;
        self.enforce(label, Constraint::Linear { terms: Vec::new(), constant: value, out: var });
        Ok(var)
    }

    /// Add a constraint
    pub fn enforce(&mut self, label: &str, constraint: Constraint) {
        self.constraints.push(LabeledConstraint {
            label: label.to_string(),
            constraint,
        });
    }

    /// Current value of a variable (zero in setup mode)
    pub fn value(&self, var: Var) -> Fr {
        self.assignments[var.0]
    }

    /// Values of several variables
    pub fn values<const N: usize>(&self, vars: &[Var; N]) -> [Fr; N] {
        vars.map(|var| self.value(var))
    }

    /// Public input vector in allocation order
    pub fn public_inputs(&self) -> &[Fr] {
        &self.assignments[..self.num_public]
    }

    /// Private part of the assignment, in allocation order
    pub fn private_assignment(&self) -> &[Fr] {
        &self.assignments[self.num_public..]
    }

    /// Fill a shape-only system with a full assignment
    pub fn assign(&mut self, public: &[Fr], private: &[Fr]) -> CircuitResult<()> {
        if !self.setup_mode {
            return Err(CircuitError::InvalidInput("system is already assigned".to_string()));
        }
        if public.len() != self.num_public || public.len() + private.len() != self.assignments.len() {
            return Err(CircuitError::InvalidInput(format!(
                "assignment has {} public and {} private values, shape has {} and {}",
                public.len(),
                private.len(),
                self.num_public,
                self.assignments.len() - self.num_public
            )));
        }
        self.assignments.clear();
        self.assignments.extend_from_slice(public);
        self.assignments.extend_from_slice(private);
        self.setup_mode = false;
        Ok(())
    }

    /// Number of public variables
    pub fn num_public(&self) -> usize {
        self.num_public
    }

    /// Number of variables
    pub fn num_variables(&self) -> usize {
        self.assignments.len()
    }

    /// Recorded constraints
    pub fn constraints(&self) -> &[LabeledConstraint] {
        &self.constraints
    }

    /// Permutation used by `Permutation` constraints
    pub fn permutation(&self) -> &PoseidonPermutation {
        &self.permutation
    }

    /// Check every constraint, reporting the first violation
    pub fn check(&self) -> CircuitResult<()> {
        if self.setup_mode {
            return Err(CircuitError::AssignmentMissing("setup-mode system has no assignment".to_string()));
        }
        for (index, labeled) in self.constraints.iter().enumerate() {
            if let Err(reason) = self.check_constraint(&labeled.constraint) {
                return Err(CircuitError::Unsatisfied {
                    index,
                    label: labeled.label.clone(),
                    reason,
                });
            }
        }
        Ok(())
    }

    /// Whether all constraints hold
    pub fn is_satisfied(&self) -> bool {
        self.check().is_ok()
    }

    /// Digest of the structure (variable counts, constraint kinds, indices,
    /// constants and the permutation parameters) independent of the assignment
    pub fn shape_digest(&self) -> [u8; 32] {
        let mut encoded = Vec::new();
        encoded.extend_from_slice(domains::DOMAIN_SHAPE);
        encoded.extend_from_slice(&(self.num_public as u64).to_be_bytes());
        encoded.extend_from_slice(&(self.assignments.len() as u64).to_be_bytes());
        for labeled in &self.constraints {
            encode_shape(&labeled.constraint, &mut encoded);
        }
        let params = self.permutation.params();
        encoded.extend_from_slice(&(params.full_rounds as u64).to_be_bytes());
        encoded.extend_from_slice(&(params.partial_rounds as u64).to_be_bytes());
        for row in params.round_constants.iter().chain(params.mds_matrix.iter()) {
            for element in row {
                encoded.extend_from_slice(&field_to_be_bytes(element));
            }
        }
        CryptoUtils::blake2s256(&encoded)
    }

    fn check_constraint(&self, constraint: &Constraint) -> Result<(), String> {
        match constraint {
            Constraint::Equal { lhs, rhs } => {
                if self.value(*lhs) != self.value(*rhs) {
                    return Err("values differ".to_string());
                }
            }
            Constraint::Linear { terms, constant, out } => {
                let sum = terms
                    .iter()
                    .fold(*constant, |acc, (coefficient, var)| acc + *coefficient * self.value(*var));
                if sum != self.value(*out) {
                    return Err("linear combination mismatch".to_string());
                }
            }
            Constraint::Mul { a, b, out } => {
                if self.value(*a) * self.value(*b) != self.value(*out) {
                    return Err("product mismatch".to_string());
                }
            }
            Constraint::Range { var, bits } => {
                if field_to_biguint(&self.value(*var)).bits() > u64::from(*bits) {
                    return Err(format!("value exceeds {} bits", bits));
                }
            }
            Constraint::ColumnProduct { terms, carry_in, out, carry_out } => {
                let mut lhs = terms
                    .iter()
                    .fold(Fr::zero(), |acc, (a, b)| acc + self.value(*a) * self.value(*b));
                if let Some(carry) = carry_in {
                    lhs += self.value(*carry);
                }
                let shift = pow2(u64::from(LIMB_BITS));
                let rhs = self.value(*out) + self.value(*carry_out) * shift;
                if lhs != rhs {
                    return Err("column sum does not match limb and carry".to_string());
                }
            }
            Constraint::GreaterThan { limbs, bound } => {
                let value = self.limbs_value(limbs)?;
                if value <= BigUint::from(*bound) {
                    return Err(format!("value is not greater than {}", bound));
                }
            }
            Constraint::ScalarMul { scalar, base, out } => {
                let scalar = self.limb_array(scalar)?;
                let expected = match base {
                    Base::Generator => CurvePoint::mul_limbs(&scalar, None),
                    Base::Point(point) => {
                        let base_point = self.point(point)?;
                        CurvePoint::mul_limbs(&scalar, Some(&base_point))
                    }
                }
                .map_err(|e| e.to_string())?;
                if self.point(out)? != expected {
                    return Err("point is not the scalar multiple".to_string());
                }
            }
            Constraint::Permutation { input, output } => {
                let permuted = self.permutation.permute(&self.values(input));
                if permuted != self.values(output) {
                    return Err("permutation output mismatch".to_string());
                }
            }
            Constraint::Sha256 { words, out } => {
                let mut preimage = Vec::with_capacity(words.len() * 32);
                for word in words {
                    match word {
                        Word::Field(var) => preimage.extend_from_slice(&field_to_be_bytes(&self.value(*var))),
                        Word::Limbs(limbs) => {
                            preimage.extend_from_slice(&limbs_to_be_bytes(&self.limb_array(limbs)?))
                        }
                    }
                }
                let digest = CryptoUtils::sha256(&preimage);
                let hi = Fr::from_be_bytes_mod_order(&digest[..16]);
                let lo = Fr::from_be_bytes_mod_order(&digest[16..]);
                if hi != self.value(out[0]) || lo != self.value(out[1]) {
                    return Err("digest halves mismatch".to_string());
                }
            }
        }
        Ok(())
    }

    fn limb_array(&self, vars: &[Var; 4]) -> Result<[u64; 4], String> {
        let mut limbs = [0u64; 4];
        for (limb, var) in limbs.iter_mut().zip(vars.iter()) {
            *limb = field_to_limb(&self.value(*var)).map_err(|e| e.to_string())?;
        }
        Ok(limbs)
    }

    fn limbs_value(&self, vars: &[Var]) -> Result<BigUint, String> {
        let limbs = vars
            .iter()
            .map(|var| field_to_limb(&self.value(*var)).map_err(|e| e.to_string()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(from_limbs(&limbs))
    }

    fn point(&self, point: &PointVars) -> Result<CurvePoint, String> {
        let x = self.limb_array(&point.x)?;
        let y = self.limb_array(&point.y)?;
        CurvePoint::from_limbs(&x, &y).map_err(|e| e.to_string())
    }
}

fn encode_vars(vars: &[Var], out: &mut Vec<u8>) {
    out.extend_from_slice(&(vars.len() as u64).to_be_bytes());
    for var in vars {
        out.extend_from_slice(&(var.0 as u64).to_be_bytes());
    }
}

fn encode_point(point: &PointVars, out: &mut Vec<u8>) {
    encode_vars(&point.x, out);
    encode_vars(&point.y, out);
}

fn encode_shape(constraint: &Constraint, out: &mut Vec<u8>) {
    match constraint {
        Constraint::Equal { lhs, rhs } => {
            out.push(0);
            encode_vars(&[*lhs, *rhs], out);
        }
        Constraint::Linear { terms, constant, out: result } => {
            out.push(1);
            out.extend_from_slice(&(terms.len() as u64).to_be_bytes());
            for (coefficient, var) in terms {
                out.extend_from_slice(&field_to_be_bytes(coefficient));
                encode_vars(&[*var], out);
            }
            out.extend_from_slice(&field_to_be_bytes(constant));
            encode_vars(&[*result], out);
        }
        Constraint::Mul { a, b, out: result } => {
            out.push(2);
            encode_vars(&[*a, *b, *result], out);
        }
        Constraint::Range { var, bits } => {
            out.push(3);
            encode_vars(&[*var], out);
            out.extend_from_slice(&bits.to_be_bytes());
        }
        Constraint::ColumnProduct { terms, carry_in, out: result, carry_out } => {
            out.push(4);
            let flat: Vec<Var> = terms.iter().flat_map(|(a, b)| [*a, *b]).collect();
            encode_vars(&flat, out);
            encode_vars(&carry_in.iter().copied().collect::<Vec<_>>(), out);
            encode_vars(&[*result, *carry_out], out);
        }
        Constraint::GreaterThan { limbs, bound } => {
            out.push(5);
            encode_vars(limbs, out);
            out.extend_from_slice(&bound.to_be_bytes());
        }
        Constraint::ScalarMul { scalar, base, out: result } => {
            out.push(6);
            encode_vars(scalar, out);
            match base {
                Base::Generator => out.push(0),
                Base::Point(point) => {
                    out.push(1);
                    encode_point(point, out);
                }
            }
            encode_point(result, out);
        }
        Constraint::Permutation { input, output } => {
            out.push(7);
            encode_vars(input, out);
            encode_vars(output, out);
        }
        Constraint::Sha256 { words, out: result } => {
            out.push(8);
            out.extend_from_slice(&(words.len() as u64).to_be_bytes());
            for word in words {
                match word {
                    Word::Field(var) => {
                        out.push(0);
                        encode_vars(&[*var], out);
                    }
                    Word::Limbs(limbs) => {
                        out.push(1);
                        encode_vars(limbs, out);
                    }
                }
            }
            encode_vars(result, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system() -> ConstraintSystem {
        ConstraintSystem::new(PoseidonPermutation::standard().clone())
    }

    #[test]
    fn test_public_before_private() {
        let mut cs = system();
        cs.alloc_public("a", || Ok(Fr::from(1u64))).unwrap();
        cs.alloc("b", || Ok(Fr::from(2u64))).unwrap();
        assert!(matches!(
            cs.alloc_public("c", || Ok(Fr::from(3u64))),
            Err(CircuitError::PublicAfterPrivate(_))
        ));
        assert_eq!(cs.public_inputs(), &[Fr::from(1u64)]);
    }

    #[test]
    fn test_basic_constraints() {
        let mut cs = system();
        let a = cs.alloc("a", || Ok(Fr::from(6u64))).unwrap();
        let b = cs.alloc("b", || Ok(Fr::from(7u64))).unwrap();
        let c = cs.alloc("c", || Ok(Fr::from(42u64))).unwrap();
        cs.enforce("mul", Constraint::Mul { a, b, out: c });
        cs.enforce("range", Constraint::Range { var: c, bits: 6 });
        cs.enforce(
            "linear",
            Constraint::Linear { terms: vec![(Fr::from(7u64), a)], constant: Fr::from(0u64), out: c },
        );
        assert!(cs.check().is_ok());

        cs.enforce("tight range", Constraint::Range { var: c, bits: 5 });
        match cs.check() {
            Err(CircuitError::Unsatisfied { index, label, .. }) => {
                assert_eq!(index, 3);
                assert_eq!(label, "tight range");
            }
            other => panic!("expected violation, got {:?}", other),
        }
    }

    #[test]
    fn test_column_product_with_carry() {
        // (2^64 - 1)^2 = (2^64 - 2)·2^64 + 1
        let mut cs = system();
        let max = Fr::from(u64::MAX);
        let a = cs.alloc("a", || Ok(max)).unwrap();
        let b = cs.alloc("b", || Ok(max)).unwrap();
        let out = cs.alloc("out", || Ok(Fr::from(1u64))).unwrap();
        let carry = cs.alloc("carry", || Ok(Fr::from(u64::MAX - 1))).unwrap();
        cs.enforce("column", Constraint::ColumnProduct { terms: vec![(a, b)], carry_in: None, out, carry_out: carry });
        assert!(cs.is_satisfied());

        let bad = cs.alloc("bad", || Ok(Fr::from(u64::MAX))).unwrap();
        cs.enforce("bad column", Constraint::ColumnProduct { terms: vec![(a, b)], carry_in: None, out, carry_out: bad });
        assert!(!cs.is_satisfied());
    }

    #[test]
    fn test_greater_than() {
        let mut cs = system();
        let one = cs.alloc("one", || Ok(Fr::from(1u64))).unwrap();
        let zero = cs.alloc("zero", || Ok(Fr::from(0u64))).unwrap();
        cs.enforce("wide", Constraint::GreaterThan { limbs: vec![zero, one], bound: 1 });
        assert!(cs.is_satisfied());
        cs.enforce("one", Constraint::GreaterThan { limbs: vec![one, zero], bound: 1 });
        assert!(!cs.is_satisfied());
    }

    #[test]
    fn test_permutation_constraint() {
        let perm = PoseidonPermutation::standard();
        let input = [Fr::from(1u64), Fr::from(2u64), Fr::from(3u64), Fr::from(4u64)];
        let output = perm.permute(&input);

        let mut cs = system();
        let mut in_vars = Vec::new();
        let mut out_vars = Vec::new();
        for i in 0..POSEIDON_WIDTH {
            in_vars.push(cs.alloc("in", || Ok(input[i])).unwrap());
            out_vars.push(cs.alloc("out", || Ok(output[i])).unwrap());
        }
        cs.enforce(
            "perm",
            Constraint::Permutation {
                input: [in_vars[0], in_vars[1], in_vars[2], in_vars[3]],
                output: [out_vars[0], out_vars[1], out_vars[2], out_vars[3]],
            },
        );
        assert!(cs.is_satisfied());
    }

    #[test]
    fn test_setup_mode_shape_matches() {
        let build = |cs: &mut ConstraintSystem| {
            let a = cs.alloc_public("a", || Ok(Fr::from(3u64))).unwrap();
            let b = cs.alloc("b", || Ok(Fr::from(9u64))).unwrap();
            cs.enforce("square", Constraint::Mul { a, b: a, out: b });
        };

        let mut setup = ConstraintSystem::new_setup(PoseidonPermutation::standard().clone());
        build(&mut setup);
        let mut real = system();
        build(&mut real);

        assert_eq!(setup.shape_digest(), real.shape_digest());
        assert!(setup.check().is_err());
        assert!(real.check().is_ok());
        assert_eq!(setup.public_inputs(), &[Fr::zero()]);

        setup.assign(&[Fr::from(3u64)], real.private_assignment()).unwrap();
        assert!(setup.check().is_ok());
        assert!(setup.assign(&[Fr::from(3u64)], &[Fr::from(9u64)]).is_err());
    }

    #[test]
    fn test_assign_rejects_wrong_lengths() {
        let build = |cs: &mut ConstraintSystem| {
            let a = cs.alloc_public("a", || Ok(Fr::from(3u64))).unwrap();
            let b = cs.alloc("b", || Ok(Fr::from(9u64))).unwrap();
            cs.enforce("square", Constraint::Mul { a, b: a, out: b });
        };
        let mut setup = ConstraintSystem::new_setup(PoseidonPermutation::standard().clone());
        build(&mut setup);

        assert!(setup.assign(&[], &[Fr::from(3u64), Fr::from(9u64)]).is_err());
        assert!(setup.assign(&[Fr::from(3u64)], &[]).is_err());
        assert!(setup.is_setup_mode());

        setup.assign(&[Fr::from(3u64)], &[Fr::from(10u64)]).unwrap();
        assert!(!setup.is_satisfied());
    }

    #[test]
    fn test_shape_digest_binds_permutation() {
        let build = |cs: &mut ConstraintSystem| {
            cs.alloc_public("a", || Ok(Fr::from(3u64))).unwrap();
        };
        let mut standard = ConstraintSystem::new_setup(PoseidonPermutation::standard().clone());
        build(&mut standard);

        let mut params = PoseidonPermutation::standard().params().clone();
        params.mds_matrix[0][0] += Fr::from(1u64);
        let mut tweaked_mds = ConstraintSystem::new_setup(PoseidonPermutation::new(params));
        build(&mut tweaked_mds);
        assert_ne!(standard.shape_digest(), tweaked_mds.shape_digest());

        let mut params = PoseidonPermutation::standard().params().clone();
        params.full_rounds -= 2;
        params.partial_rounds += 2;
        let mut resplit = ConstraintSystem::new_setup(PoseidonPermutation::new(params));
        build(&mut resplit);
        assert_ne!(standard.shape_digest(), resplit.shape_digest());
    }
}
