//! Optimizer input templates: plain text with `%key%` placeholders.
//!
//! Recognized keys are substituted with values from the crystal and the
//! surrounding context; unknown keys stay in the output verbatim so the
//! back-end (or the user) can spot them.

use std::fmt::Write as _;

use crate::base::DEG_TO_RAD;
use crate::model::{elements, Crystal};

pub const ANGSTROM_TO_BOHR: f64 = 1.889725989;

/// Values that come from the run rather than the crystal itself.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    pub user1: String,
    pub user2: String,
    pub user3: String,
    pub user4: String,
    pub filename: String,
    pub rempath: String,
    pub description: String,
}

/// Substitute every recognized `%key%` in `template`. Unknown keys are
/// left as `%key%` literally.
pub fn interpret_template(template: &str, crystal: &Crystal, ctx: &TemplateContext) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('%') {
            Some(end) => {
                let key = &after[..end];
                match substitute(key, crystal, ctx) {
                    Some(value) => {
                        out.push_str(&value);
                        rest = &after[end + 1..];
                    }
                    None => {
                        // Leave the first '%' literal and rescan from the
                        // second one, which may open a real key.
                        out.push('%');
                        rest = after;
                    }
                }
            }
            None => {
                out.push('%');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn substitute(key: &str, crystal: &Crystal, ctx: &TemplateContext) -> Option<String> {
    let (a, b, c) = crystal.lattice().lengths();
    let (alpha, beta, gamma) = crystal.lattice().angles();

    let value = match key {
        "user1" => ctx.user1.clone(),
        "user2" => ctx.user2.clone(),
        "user3" => ctx.user3.clone(),
        "user4" => ctx.user4.clone(),
        "coords" => coord_lines(crystal, false, false),
        "coordsId" => coord_lines(crystal, true, false),
        "coordsFrac" => coord_lines(crystal, false, true),
        "coordsFracId" => coord_lines(crystal, true, true),
        "cellMatrixAngstrom" => cell_matrix(crystal, 1.0),
        "cellMatrixBohr" => cell_matrix(crystal, ANGSTROM_TO_BOHR),
        "cellVector1Angstrom" => cell_vector(crystal, 0, 1.0),
        "cellVector2Angstrom" => cell_vector(crystal, 1, 1.0),
        "cellVector3Angstrom" => cell_vector(crystal, 2, 1.0),
        "cellVector1Bohr" => cell_vector(crystal, 0, ANGSTROM_TO_BOHR),
        "cellVector2Bohr" => cell_vector(crystal, 1, ANGSTROM_TO_BOHR),
        "cellVector3Bohr" => cell_vector(crystal, 2, ANGSTROM_TO_BOHR),
        "a" => format!("{:.6}", a),
        "b" => format!("{:.6}", b),
        "c" => format!("{:.6}", c),
        "alphaRad" => format!("{:.6}", alpha * DEG_TO_RAD),
        "betaRad" => format!("{:.6}", beta * DEG_TO_RAD),
        "gammaRad" => format!("{:.6}", gamma * DEG_TO_RAD),
        "alphaDeg" => format!("{:.6}", alpha),
        "betaDeg" => format!("{:.6}", beta),
        "gammaDeg" => format!("{:.6}", gamma),
        "volume" => format!("{:.6}", crystal.volume()),
        "numAtoms" => crystal.num_atoms().to_string(),
        "numSpecies" => crystal.composition().len().to_string(),
        "filename" => ctx.filename.clone(),
        "rempath" => ctx.rempath.clone(),
        "gen" => crystal.generation.to_string(),
        "id" => crystal.id.to_string(),
        "optStep" => crystal.current_opt_step.to_string(),
        "description" => ctx.description.clone(),
        "POSCAR" => poscar(crystal, ctx),
        _ => return None,
    };
    Some(value)
}

fn coord_lines(crystal: &Crystal, with_id: bool, fractional: bool) -> String {
    let mut out = String::new();
    for atom in crystal.atoms() {
        let v = if fractional { atom.frac } else { atom.cart };
        let symbol = elements::symbol(atom.atomic_number);
        if with_id {
            let _ = writeln!(
                out,
                "{} {} {:.8} {:.8} {:.8}",
                symbol, atom.atomic_number, v[0], v[1], v[2]
            );
        } else {
            let _ = writeln!(out, "{} {:.8} {:.8} {:.8}", symbol, v[0], v[1], v[2]);
        }
    }
    out
}

fn cell_vector(crystal: &Crystal, index: usize, scale: f64) -> String {
    let v = crystal.lattice().basis.column(index) * scale;
    format!("{:.8} {:.8} {:.8}", v[0], v[1], v[2])
}

fn cell_matrix(crystal: &Crystal, scale: f64) -> String {
    format!(
        "{}\n{}\n{}\n",
        cell_vector(crystal, 0, scale),
        cell_vector(crystal, 1, scale),
        cell_vector(crystal, 2, scale)
    )
}

/// The fixed crystallographic layout: comment, scale 1.0, lattice vectors,
/// per-element counts sorted by element symbol, `Direct`, fractional
/// coordinates grouped by element in the same order.
fn poscar(crystal: &Crystal, ctx: &TemplateContext) -> String {
    let mut species: Vec<(&'static str, u32, u32)> = crystal
        .composition()
        .into_iter()
        .map(|(z, count)| (elements::symbol(z), z, count))
        .collect();
    species.sort_by(|x, y| x.0.cmp(y.0));

    let mut out = String::new();
    let _ = writeln!(out, "{}", ctx.description);
    let _ = writeln!(out, "1.0");
    for i in 0..3 {
        let _ = writeln!(out, "  {}", cell_vector(crystal, i, 1.0));
    }
    let counts: Vec<String> = species.iter().map(|(_, _, n)| n.to_string()).collect();
    let _ = writeln!(out, "{}", counts.join(" "));
    let _ = writeln!(out, "Direct");
    for &(_, z, _) in species.iter() {
        for atom in crystal.atoms().iter().filter(|a| a.atomic_number == z) {
            let _ = writeln!(
                out,
                "  {:.8} {:.8} {:.8}",
                atom.frac[0], atom.frac[1], atom.frac[2]
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use nalgebra::{vector, Matrix3};

    use super::{interpret_template, TemplateContext, ANGSTROM_TO_BOHR};
    use crate::base::Lattice;
    use crate::model::Crystal;

    fn sample() -> Crystal {
        let mut xtal = Crystal::new(Lattice::new(Matrix3::identity() * 4.0));
        xtal.add_atom(12, vector![0.0, 0.0, 0.0]);
        xtal.add_atom(8, vector![0.5, 0.5, 0.5]);
        xtal.generation = 2;
        xtal.id = 7;
        xtal.current_opt_step = 1;
        xtal
    }

    fn ctx() -> TemplateContext {
        TemplateContext {
            user1: "u-one".to_string(),
            description: "rocksalt search".to_string(),
            filename: "job.in".to_string(),
            rempath: "/remote/00002x00007".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_simple_keys() {
        let xtal = sample();
        let out = interpret_template("gen=%gen% id=%id% step=%optStep% n=%numAtoms%", &xtal, &ctx());
        assert_eq!(out, "gen=2 id=7 step=1 n=2");
    }

    #[test]
    fn test_unknown_key_left_verbatim() {
        let xtal = sample();
        let out = interpret_template("%nonsense% and %user1%", &xtal, &ctx());
        assert_eq!(out, "%nonsense% and u-one");
    }

    #[test]
    fn test_cell_and_params() {
        let xtal = sample();
        let out = interpret_template("%a% %volume%", &xtal, &ctx());
        assert_eq!(out, "4.000000 64.000000");
        let bohr = interpret_template("%cellVector1Bohr%", &xtal, &ctx());
        let expected = 4.0 * ANGSTROM_TO_BOHR;
        assert!(bohr.starts_with(&format!("{:.8}", expected)));
    }

    #[test]
    fn test_coords_have_symbols() {
        let xtal = sample();
        let out = interpret_template("%coordsFracId%", &xtal, &ctx());
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Mg 12 "));
        assert!(lines[1].starts_with("O 8 "));
    }

    #[test]
    fn test_poscar_layout() {
        let xtal = sample();
        let out = interpret_template("%POSCAR%", &xtal, &ctx());
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "rocksalt search");
        assert_eq!(lines[1], "1.0");
        // counts sorted by symbol: Mg before O
        assert_eq!(lines[5].trim(), "1 1");
        assert_eq!(lines[6], "Direct");
        assert!(lines[7].trim().starts_with("0.0"));
        assert_eq!(lines.len(), 9);
    }
}
