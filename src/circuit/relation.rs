//! Bounty Relation
//!
//! The single predicate a proof certifies. Public signals, in order:
//! `Qa.x[4], Qa.y[4], Qb.x[4], Qb.y[4], nonce, ew[..], n[..], Hpub0, Hpub1`.
//! Private signals: `p[..], q[..], db[4], Qs.x[4], Qs.y[4]`.
//!
//! Constraints:
//! 1. `Qb == db·G`
//! 2. `Qs == db·Qa`
//! 3. `ew` is the Poseidon cipher of `p ‖ q` under `key(Qs)` and `nonce`
//! 4. `(Hpub0, Hpub1)` is the split SHA-256 of the public parameters
//! 5. `n == p·q` column by column with range-checked limbs and carries
//! 6. `p > 1` and `q > 1`

use ark_bn254::Fr;
use ark_ff::{One, Zero};
use num_bigint::BigUint;
use serde::{Serialize, Deserialize};
use crate::circuit::constraint_system::{Base, Constraint, ConstraintSystem, PointVars, Var, Word};
use crate::circuit::{CircuitError, CircuitResult};
use crate::crypto::cipher::{pow2, FieldCipher, NONCE_BITS};
use crate::crypto::commitments::PublicCommitment;
use crate::crypto::key_agreement::{CurvePoint, KeyAgreement, PrivateScalar, SharedPoint};
use crate::crypto::limbs::{biguint_to_field, from_limbs, limbs_to_fields, to_limbs, field_to_biguint, LIMB_BITS, COORD_LIMBS};
use crate::crypto::poseidon::{PoseidonPermutation, POSEIDON_RATE, POSEIDON_WIDTH};

/// Fixed-arity dimensions of the relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationParams {
    /// Limbs per factor
    pub factor_limbs: usize,
    /// Limbs of the modulus
    pub modulus_limbs: usize,
}

impl Default for RelationParams {
    fn default() -> Self {
        Self {
            factor_limbs: 16,
            modulus_limbs: 32,
        }
    }
}

impl RelationParams {
    /// Create params for factors of `factor_limbs` limbs
    pub fn for_factor_limbs(factor_limbs: usize) -> Self {
        Self {
            factor_limbs,
            modulus_limbs: 2 * factor_limbs,
        }
    }

    /// Reject inconsistent dimensions
    pub fn validate(&self) -> CircuitResult<()> {
        if self.factor_limbs == 0 {
            return Err(CircuitError::InvalidInput("factor_limbs must be positive".to_string()));
        }
        if self.modulus_limbs != 2 * self.factor_limbs {
            return Err(CircuitError::InvalidInput(format!(
                "modulus_limbs ({}) must be twice factor_limbs ({})",
                self.modulus_limbs, self.factor_limbs
            )));
        }
        Ok(())
    }

    /// Plaintext limbs (`p ‖ q`)
    pub fn witness_limbs(&self) -> usize {
        2 * self.factor_limbs
    }

    /// Ciphertext elements
    pub fn ciphertext_len(&self) -> usize {
        FieldCipher::ciphertext_len(self.witness_limbs())
    }

    /// Length of the public input vector
    pub fn public_input_len(&self) -> usize {
        4 * COORD_LIMBS + 1 + self.ciphertext_len() + self.modulus_limbs + 2
    }

    /// Bit bound for product carries
    fn carry_bits(&self) -> u32 {
        LIMB_BITS + (usize::BITS - self.factor_limbs.leading_zeros()) + 1
    }
}

/// Public values the proof is checked against
#[derive(Debug, Clone, PartialEq)]
pub struct PublicInputs {
    pub sender: CurvePoint,
    pub receiver: CurvePoint,
    pub nonce: Fr,
    pub ciphertext: Vec<Fr>,
    pub modulus_limbs: Vec<u64>,
    pub commitment: PublicCommitment,
}

impl PublicInputs {
    /// Field elements in the relation's public signal order
    pub fn to_field_elements(&self) -> Vec<Fr> {
        let mut inputs = Vec::new();
        for point in [&self.sender, &self.receiver] {
            let (x, y) = point.to_limbs();
            inputs.extend(limbs_to_fields(&x));
            inputs.extend(limbs_to_fields(&y));
        }
        inputs.push(self.nonce);
        inputs.extend_from_slice(&self.ciphertext);
        inputs.extend(limbs_to_fields(&self.modulus_limbs));
        let (hpub0, hpub1) = self.commitment.halves();
        inputs.push(hpub0);
        inputs.push(hpub1);
        inputs
    }
}

/// Secret values known to the prover
#[derive(Debug, Clone)]
pub struct BountyWitness {
    pub p: BigUint,
    pub q: BigUint,
    pub receiver_scalar: PrivateScalar,
    pub shared_point: SharedPoint,
}

impl BountyWitness {
    /// Witness whose shared point is derived honestly from `db·Qa`
    pub fn new(p: BigUint, q: BigUint, receiver_scalar: PrivateScalar, sender: &CurvePoint) -> CircuitResult<Self> {
        let shared_point = KeyAgreement::derive_shared(&receiver_scalar, sender)
            .map_err(|e| CircuitError::InvalidInput(e.to_string()))?;
        Ok(Self {
            p,
            q,
            receiver_scalar,
            shared_point,
        })
    }

    /// Cipher plaintext `p ‖ q` as limbs
    pub fn plaintext_limbs(&self, params: &RelationParams) -> CircuitResult<Vec<u64>> {
        let mut limbs = to_limbs(&self.p, params.factor_limbs)
            .map_err(|e| CircuitError::InvalidInput(format!("p: {}", e)))?;
        limbs.extend(
            to_limbs(&self.q, params.factor_limbs)
                .map_err(|e| CircuitError::InvalidInput(format!("q: {}", e)))?,
        );
        Ok(limbs)
    }
}

/// Synthesizer for the bounty relation
pub struct BountyRelation<'a> {
    params: RelationParams,
    permutation: &'a PoseidonPermutation,
}

impl<'a> BountyRelation<'a> {
    /// Relation over the given dimensions and permutation
    pub fn new(params: RelationParams, permutation: &'a PoseidonPermutation) -> Self {
        Self { params, permutation }
    }

    /// Dimensions
    pub fn params(&self) -> &RelationParams {
        &self.params
    }

    /// Permutation shared with the cipher
    pub fn permutation(&self) -> &'a PoseidonPermutation {
        self.permutation
    }

    /// Shape-only system for key generation
    pub fn setup_system(&self) -> CircuitResult<ConstraintSystem> {
        let mut cs = ConstraintSystem::new_setup(self.permutation.clone());
        self.synthesize(&mut cs, None, None)?;
        Ok(cs)
    }

    /// Synthesize with a full assignment and check it. Fails closed on the
    /// first unsatisfied constraint.
    pub fn generate_witness(&self, public: &PublicInputs, witness: &BountyWitness) -> CircuitResult<ConstraintSystem> {
        let mut cs = ConstraintSystem::new(self.permutation.clone());
        self.synthesize(&mut cs, Some(public), Some(witness))?;
        cs.check()?;
        Ok(cs)
    }

    /// Emit all variables and constraints into `cs`
    pub fn synthesize(
        &self,
        cs: &mut ConstraintSystem,
        public: Option<&PublicInputs>,
        witness: Option<&BountyWitness>,
    ) -> CircuitResult<()> {
        self.params.validate()?;
        if let Some(public) = public {
            self.check_public_shape(public)?;
        }

        // Public signals
        let sender = alloc_point(cs, "Qa", true, public.map(|p| p.sender))?;
        let receiver = alloc_point(cs, "Qb", true, public.map(|p| p.receiver))?;
        let nonce = cs.alloc_public("nonce", || Ok(require(public, "nonce")?.nonce))?;
        let ciphertext = (0..self.params.ciphertext_len())
            .map(|i| {
                cs.alloc_public(&format!("ew[{}]", i), || Ok(require(public, "ew")?.ciphertext[i]))
            })
            .collect::<CircuitResult<Vec<_>>>()?;
        let modulus = (0..self.params.modulus_limbs)
            .map(|i| {
                cs.alloc_public(&format!("n[{}]", i), || {
                    Ok(Fr::from(require(public, "n")?.modulus_limbs[i]))
                })
            })
            .collect::<CircuitResult<Vec<_>>>()?;
        let hpub = [
            cs.alloc_public("Hpub0", || Ok(require(public, "Hpub")?.commitment.halves().0))?,
            cs.alloc_public("Hpub1", || Ok(require(public, "Hpub")?.commitment.halves().1))?,
        ];

        // Private signals
        let plaintext_limbs = match witness {
            Some(w) => Some(w.plaintext_limbs(&self.params)?),
            None => None,
        };
        let plaintext = (0..self.params.witness_limbs())
            .map(|i| {
                let label = if i < self.params.factor_limbs {
                    format!("p[{}]", i)
                } else {
                    format!("q[{}]", i - self.params.factor_limbs)
                };
                let limbs = plaintext_limbs.as_ref();
                cs.alloc(&label, || {
                    limbs
                        .map(|l| Fr::from(l[i]))
                        .ok_or_else(|| CircuitError::AssignmentMissing(label.clone()))
                })
            })
            .collect::<CircuitResult<Vec<_>>>()?;
        let (p, q) = plaintext.split_at(self.params.factor_limbs);

        let scalar_limbs = witness.map(|w| w.receiver_scalar.to_limbs());
        let scalar_vars = (0..COORD_LIMBS)
            .map(|i| {
                cs.alloc(&format!("db[{}]", i), || {
                    scalar_limbs
                        .map(|l| Fr::from(l[i]))
                        .ok_or_else(|| CircuitError::AssignmentMissing("db".to_string()))
                })
            })
            .collect::<CircuitResult<Vec<_>>>()?;
        let scalar = [scalar_vars[0], scalar_vars[1], scalar_vars[2], scalar_vars[3]];
        let shared = alloc_point(cs, "Qs", false, witness.map(|w| w.shared_point))?;

        // Limb ranges
        for (name, vars) in [("p", p), ("q", q), ("n", &modulus[..]), ("db", &scalar[..])] {
            for var in vars {
                cs.enforce(&format!("{} limb range", name), Constraint::Range { var: *var, bits: LIMB_BITS });
            }
        }
        for (name, point) in [("Qa", &sender), ("Qb", &receiver), ("Qs", &shared)] {
            for var in point.x.iter().chain(point.y.iter()) {
                cs.enforce(&format!("{} limb range", name), Constraint::Range { var: *var, bits: LIMB_BITS });
            }
        }

        // 1, 2: key derivation
        cs.enforce(
            "Qb == db*G",
            Constraint::ScalarMul { scalar, base: Base::Generator, out: receiver },
        );
        cs.enforce(
            "Qs == db*Qa",
            Constraint::ScalarMul { scalar, base: Base::Point(sender), out: shared },
        );

        // 3: encryption
        self.enforce_encryption(cs, &shared, nonce, &plaintext, &ciphertext)?;

        // 4: commitment
        let mut words = vec![
            Word::Limbs(sender.x),
            Word::Limbs(sender.y),
            Word::Limbs(receiver.x),
            Word::Limbs(receiver.y),
            Word::Field(nonce),
        ];
        words.extend(ciphertext.iter().map(|var| Word::Field(*var)));
        words.extend(modulus.iter().map(|var| Word::Field(*var)));
        cs.enforce("Hpub == sha256(public)", Constraint::Sha256 { words, out: hpub });

        // 5: factorization
        self.enforce_product(cs, p, q, &modulus)?;

        // 6: non-triviality
        cs.enforce("p > 1", Constraint::GreaterThan { limbs: p.to_vec(), bound: 1 });
        cs.enforce("q > 1", Constraint::GreaterThan { limbs: q.to_vec(), bound: 1 });

        Ok(())
    }

    fn check_public_shape(&self, public: &PublicInputs) -> CircuitResult<()> {
        if public.ciphertext.len() != self.params.ciphertext_len() {
            return Err(CircuitError::InvalidInput(format!(
                "ciphertext has {} elements, relation expects {}",
                public.ciphertext.len(),
                self.params.ciphertext_len()
            )));
        }
        if public.modulus_limbs.len() != self.params.modulus_limbs {
            return Err(CircuitError::InvalidInput(format!(
                "modulus has {} limbs, relation expects {}",
                public.modulus_limbs.len(),
                self.params.modulus_limbs
            )));
        }
        Ok(())
    }

    fn enforce_encryption(
        &self,
        cs: &mut ConstraintSystem,
        shared: &PointVars,
        nonce: Var,
        plaintext: &[Var],
        ciphertext: &[Var],
    ) -> CircuitResult<()> {
        let limb_shift = pow2(u64::from(LIMB_BITS));
        let k0_value = cs.value(shared.x[0]) + cs.value(shared.x[1]) * limb_shift;
        let k0 = cs.alloc("k0", || Ok(k0_value))?;
        cs.enforce(
            "k0 = Qs.x[0] + Qs.x[1]*2^64",
            Constraint::Linear {
                terms: vec![(Fr::one(), shared.x[0]), (limb_shift, shared.x[1])],
                constant: Fr::zero(),
                out: k0,
            },
        );
        let k1_value = cs.value(shared.x[2]) + cs.value(shared.x[3]) * limb_shift;
        let k1 = cs.alloc("k1", || Ok(k1_value))?;
        cs.enforce(
            "k1 = Qs.x[2] + Qs.x[3]*2^64",
            Constraint::Linear {
                terms: vec![(Fr::one(), shared.x[2]), (limb_shift, shared.x[3])],
                constant: Fr::zero(),
                out: k1,
            },
        );

        cs.enforce("nonce range", Constraint::Range { var: nonce, bits: NONCE_BITS as u32 });
        let length_tag = Fr::from(plaintext.len() as u64) * pow2(NONCE_BITS);
        let domain_value = cs.value(nonce) + length_tag;
        let domain = cs.alloc("nonce + L*2^128", || Ok(domain_value))?;
        cs.enforce(
            "nonce + L*2^128",
            Constraint::Linear { terms: vec![(Fr::one(), nonce)], constant: length_tag, out: domain },
        );
        let zero = cs.constant("state[0]", Fr::zero())?;

        let mut state = [zero, k0, k1, domain];
        for (block, chunk) in ciphertext[..ciphertext.len() - 1].chunks(POSEIDON_RATE).enumerate() {
            let output = self.permute(cs, &state, &format!("block {}", block))?;
            for (j, ct) in chunk.iter().enumerate() {
                let position = block * POSEIDON_RATE + j;
                let label = format!("ew[{}] = perm + m", position);
                let terms = match plaintext.get(position) {
                    Some(m) => vec![(Fr::one(), output[j + 1]), (Fr::one(), *m)],
                    None => vec![(Fr::one(), output[j + 1])],
                };
                cs.enforce(&label, Constraint::Linear { terms, constant: Fr::zero(), out: *ct });
            }
            state = [
                output[0],
                chunk[0],
                chunk[1],
                chunk[2],
            ];
        }

        let output = self.permute(cs, &state, "tag")?;
        cs.enforce(
            "authentication element",
            Constraint::Equal { lhs: output[1], rhs: ciphertext[ciphertext.len() - 1] },
        );
        Ok(())
    }

    fn permute(
        &self,
        cs: &mut ConstraintSystem,
        input: &[Var; POSEIDON_WIDTH],
        label: &str,
    ) -> CircuitResult<[Var; POSEIDON_WIDTH]> {
        let permuted = self.permutation.permute(&cs.values(input));
        let mut output = *input;
        for (i, slot) in output.iter_mut().enumerate() {
            *slot = cs.alloc(&format!("{} perm[{}]", label, i), || Ok(permuted[i]))?;
        }
        cs.enforce(&format!("{} permutation", label), Constraint::Permutation { input: *input, output });
        Ok(output)
    }

    fn enforce_product(
        &self,
        cs: &mut ConstraintSystem,
        p: &[Var],
        q: &[Var],
        modulus: &[Var],
    ) -> CircuitResult<()> {
        let carry_bits = self.params.carry_bits();
        let mut carry_in: Option<Var> = None;

        for (k, out) in modulus.iter().enumerate() {
            let terms: Vec<(Var, Var)> = (0..p.len())
                .filter_map(|i| k.checked_sub(i).filter(|j| *j < q.len()).map(|j| (p[i], q[j])))
                .collect();

            let mut total = terms
                .iter()
                .fold(BigUint::default(), |acc, (a, b)| {
                    acc + field_to_biguint(&cs.value(*a)) * field_to_biguint(&cs.value(*b))
                });
            if let Some(carry) = carry_in {
                total += field_to_biguint(&cs.value(carry));
            }
            let carry_value = biguint_to_field(&(total >> LIMB_BITS))
                .map_err(|e| CircuitError::InvalidInput(e.to_string()))?;

            let carry_out = cs.alloc(&format!("carry[{}]", k), || Ok(carry_value))?;
            cs.enforce(&format!("carry[{}] range", k), Constraint::Range { var: carry_out, bits: carry_bits });
            cs.enforce(
                &format!("n[{}] = column {} of p*q", k, k),
                Constraint::ColumnProduct { terms, carry_in, out: *out, carry_out },
            );
            carry_in = Some(carry_out);
        }

        if let Some(last) = carry_in {
            let zero = cs.constant("zero", Fr::zero())?;
            cs.enforce("p*q fits the modulus limbs", Constraint::Equal { lhs: last, rhs: zero });
        }
        Ok(())
    }
}

/// Integer encoded by the modulus limbs of a public input
pub fn modulus_value(public: &PublicInputs) -> BigUint {
    from_limbs(&public.modulus_limbs)
}

fn require<'p>(public: Option<&'p PublicInputs>, name: &str) -> CircuitResult<&'p PublicInputs> {
    public.ok_or_else(|| CircuitError::AssignmentMissing(name.to_string()))
}

fn alloc_point(
    cs: &mut ConstraintSystem,
    name: &str,
    is_public: bool,
    point: Option<CurvePoint>,
) -> CircuitResult<PointVars> {
    let limbs = point.map(|p| p.to_limbs());
    let mut vars = Vec::with_capacity(2 * COORD_LIMBS);
    for (coordinate, offset) in [("x", 0usize), ("y", 1usize)] {
        for i in 0..COORD_LIMBS {
            let label = format!("{}.{}[{}]", name, coordinate, i);
            let value = || {
                limbs
                    .map(|(x, y)| Fr::from(if offset == 0 { x[i] } else { y[i] }))
                    .ok_or_else(|| CircuitError::AssignmentMissing(label.clone()))
            };
            let var = if is_public { cs.alloc_public(&label, value)? } else { cs.alloc(&label, value)? };
            vars.push(var);
        }
    }
    Ok(PointVars {
        x: [vars[0], vars[1], vars[2], vars[3]],
        y: [vars[4], vars[5], vars[6], vars[7]],
    })
}
