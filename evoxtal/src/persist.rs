//! Plain-text state files.
//!
//! Each crystal directory holds a `crystal.state` of `key: value` lines
//! plus a multi-line atom block; the run directory holds a single
//! `run.state` with the scheduler parameters and the list of crystal
//! directories. Resume reads `run.state` first, then every referenced
//! crystal directory.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use nalgebra::{Matrix3, Vector3};

use crate::base::{EvoxtalError, Lattice};
use crate::genetic::{CellLimits, ParamRange};
use crate::model::{Crystal, Status};
use crate::search::{FailAction, SearchParams};

pub const CRYSTAL_STATE_FILE: &str = "crystal.state";
pub const RUN_STATE_FILE: &str = "run.state";

pub fn save_crystal(crystal: &Crystal, dir: &Path) -> Result<(), EvoxtalError> {
    let mut out = String::new();
    let _ = writeln!(out, "generation: {}", crystal.generation);
    let _ = writeln!(out, "id: {}", crystal.id);
    let _ = writeln!(out, "parents: {}", crystal.parents);
    let _ = writeln!(out, "status: {}", crystal.status);
    let _ = writeln!(out, "current_opt_step: {}", crystal.current_opt_step);
    let _ = writeln!(out, "fail_count: {}", crystal.fail_count);
    let _ = writeln!(out, "spacegroup_number: {}", crystal.spacegroup_number);
    let _ = writeln!(out, "spacegroup_symbol: {}", crystal.spacegroup_symbol);
    if let Some(enthalpy) = crystal.enthalpy {
        let _ = writeln!(out, "enthalpy: {}", enthalpy);
    }
    if let Some(energy) = crystal.energy {
        let _ = writeln!(out, "energy: {}", energy);
    }
    if let Some(job_id) = crystal.job_id {
        let _ = writeln!(out, "job_id: {}", job_id);
    }
    if let Some((generation, id)) = crystal.duplicate_of {
        let _ = writeln!(out, "duplicate_of: {} {}", generation, id);
    }
    let basis = crystal.lattice().basis;
    for i in 0..3 {
        let v = basis.column(i);
        let _ = writeln!(out, "cell_vector{}: {} {} {}", i + 1, v[0], v[1], v[2]);
    }
    let _ = writeln!(out, "atoms: {}", crystal.num_atoms());
    for atom in crystal.atoms() {
        let _ = writeln!(
            out,
            "{} {} {} {}",
            atom.atomic_number, atom.frac[0], atom.frac[1], atom.frac[2]
        );
    }

    std::fs::write(dir.join(CRYSTAL_STATE_FILE), out)?;
    Ok(())
}

pub fn load_crystal(dir: &Path) -> Result<Crystal, EvoxtalError> {
    let text = std::fs::read_to_string(dir.join(CRYSTAL_STATE_FILE))?;
    let mut map = HashMap::new();
    let mut atom_lines: Vec<(u32, Vector3<f64>)> = Vec::new();
    let mut remaining_atoms: Option<usize> = None;

    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match remaining_atoms {
            Some(0) | None => {
                let (key, value) = line
                    .split_once(':')
                    .ok_or_else(|| malformed(format!("expected key: value, got `{line}`")))?;
                let value = value.trim();
                if key == "atoms" {
                    remaining_atoms = Some(parse_value::<usize>("atoms", value)?);
                } else {
                    map.insert(key.to_string(), value.to_string());
                }
            }
            Some(ref mut left) => {
                let fields: Vec<&str> = line.split_whitespace().collect();
                if fields.len() != 4 {
                    return Err(malformed(format!("bad atom line `{line}`")));
                }
                atom_lines.push((
                    parse_value("atom number", fields[0])?,
                    Vector3::new(
                        parse_value("atom x", fields[1])?,
                        parse_value("atom y", fields[2])?,
                        parse_value("atom z", fields[3])?,
                    ),
                ));
                *left -= 1;
            }
        }
    }
    if let Some(left) = remaining_atoms {
        if left != 0 {
            return Err(malformed(format!("{left} atom lines missing")));
        }
    }

    let mut columns = [Vector3::zeros(); 3];
    for (i, column) in columns.iter_mut().enumerate() {
        let value = require(&map, &format!("cell_vector{}", i + 1))?;
        let fields: Vec<&str> = value.split_whitespace().collect();
        if fields.len() != 3 {
            return Err(malformed(format!("bad cell vector `{value}`")));
        }
        *column = Vector3::new(
            parse_value("cell x", fields[0])?,
            parse_value("cell y", fields[1])?,
            parse_value("cell z", fields[2])?,
        );
    }

    let mut crystal = Crystal::new(Lattice::from_column_basis(Matrix3::from_columns(&columns)));
    for (atomic_number, frac) in atom_lines {
        crystal.add_atom(atomic_number, frac);
    }

    crystal.generation = parse_req(&map, "generation")?;
    crystal.id = parse_req(&map, "id")?;
    crystal.parents = require(&map, "parents")?.to_string();
    crystal.status = Status::from_str(require(&map, "status")?)
        .map_err(|_| malformed(format!("unknown status `{}`", map["status"])))?;
    crystal.current_opt_step = parse_req(&map, "current_opt_step")?;
    crystal.fail_count = parse_req(&map, "fail_count")?;
    crystal.spacegroup_number = parse_req(&map, "spacegroup_number")?;
    crystal.spacegroup_symbol = require(&map, "spacegroup_symbol")?.to_string();
    crystal.enthalpy = parse_opt(&map, "enthalpy")?;
    crystal.energy = parse_opt(&map, "energy")?;
    crystal.job_id = parse_opt(&map, "job_id")?;
    if let Some(value) = map.get("duplicate_of") {
        let fields: Vec<&str> = value.split_whitespace().collect();
        if fields.len() != 2 {
            return Err(malformed(format!("bad duplicate_of `{value}`")));
        }
        crystal.duplicate_of = Some((
            parse_value("duplicate_of generation", fields[0])?,
            parse_value("duplicate_of id", fields[1])?,
        ));
    }

    Ok(crystal)
}

pub fn save_run(
    params: &SearchParams,
    crystal_dirs: &[String],
    run_dir: &Path,
) -> Result<(), EvoxtalError> {
    let mut out = String::new();
    let _ = writeln!(out, "description: {}", params.description);
    let composition: Vec<String> = params
        .composition
        .iter()
        .map(|(z, n)| format!("{z}:{n}"))
        .collect();
    let _ = writeln!(out, "composition: {}", composition.join(" "));
    let _ = writeln!(out, "num_initial: {}", params.num_initial);
    let _ = writeln!(out, "pop_size: {}", params.pop_size);
    let _ = writeln!(out, "gen_total: {}", params.gen_total);
    let _ = writeln!(out, "cont_structs: {}", params.cont_structs);
    let _ = writeln!(out, "running_job_limit: {}", params.running_job_limit);
    let _ = writeln!(out, "limit_running_jobs: {}", params.limit_running_jobs);
    let _ = writeln!(out, "p_cross: {}", params.p_cross);
    let _ = writeln!(out, "p_strip: {}", params.p_strip);
    let _ = writeln!(out, "p_perm: {}", params.p_perm);
    let _ = writeln!(out, "cross_min_contribution: {}", params.cross_min_contribution);
    let _ = writeln!(out, "strip_amp_min: {}", params.strip_amp_min);
    let _ = writeln!(out, "strip_amp_max: {}", params.strip_amp_max);
    let _ = writeln!(out, "strip_per1: {}", params.strip_per1);
    let _ = writeln!(out, "strip_per2: {}", params.strip_per2);
    let _ = writeln!(out, "strip_strain_stdev_min: {}", params.strip_strain_stdev_min);
    let _ = writeln!(out, "strip_strain_stdev_max: {}", params.strip_strain_stdev_max);
    let _ = writeln!(out, "perm_ex: {}", params.perm_ex);
    let _ = writeln!(out, "perm_strain_stdev_max: {}", params.perm_strain_stdev_max);
    for (name, range) in [
        ("a", &params.limits.a),
        ("b", &params.limits.b),
        ("c", &params.limits.c),
        ("alpha", &params.limits.alpha),
        ("beta", &params.limits.beta),
        ("gamma", &params.limits.gamma),
    ] {
        let _ = writeln!(out, "{name}_min: {}", range.min);
        let _ = writeln!(out, "{name}_max: {}", range.max);
    }
    let _ = writeln!(out, "vol_min: {}", params.limits.vol_min);
    let _ = writeln!(out, "vol_max: {}", params.limits.vol_max);
    let _ = writeln!(out, "vol_fixed: {}", params.limits.vol_fixed);
    let _ = writeln!(out, "using_fixed_volume: {}", params.limits.using_fixed_volume);
    let _ = writeln!(out, "min_iad: {}", params.limits.min_iad);
    let _ = writeln!(out, "using_min_iad: {}", params.limits.using_min_iad);
    let _ = writeln!(out, "tol_enthalpy: {}", params.tol_enthalpy);
    let _ = writeln!(out, "tol_volume: {}", params.tol_volume);
    let _ = writeln!(
        out,
        "use_xtalcomp_confirmation: {}",
        params.use_xtalcomp_confirmation
    );
    let _ = writeln!(out, "xc_cart_tol: {}", params.xc_cart_tol);
    let _ = writeln!(out, "xc_angle_tol: {}", params.xc_angle_tol);
    let _ = writeln!(out, "spacegroup_tol: {}", params.spacegroup_tol);
    let _ = writeln!(out, "fail_limit: {}", params.fail_limit);
    let _ = writeln!(out, "fail_action: {}", params.fail_action);
    let _ = writeln!(out, "testing_mode: {}", params.testing_mode);
    let _ = writeln!(out, "test_structs: {}", params.test_structs);
    let _ = writeln!(
        out,
        "queue_refresh_interval_secs: {}",
        params.queue_refresh_interval.as_secs()
    );
    let _ = writeln!(
        out,
        "queue_refresh_timeout_secs: {}",
        params.queue_refresh_timeout.as_secs()
    );
    let _ = writeln!(out, "sweep_interval: {}", params.sweep_interval);
    let _ = writeln!(out, "work_dir: {}", params.work_dir.display());
    let _ = writeln!(out, "rem_path: {}", params.rem_path);
    let _ = writeln!(out, "crystal_dirs: {}", crystal_dirs.join(" "));

    std::fs::write(run_dir.join(RUN_STATE_FILE), out)?;
    Ok(())
}

pub fn load_run(run_dir: &Path) -> Result<(SearchParams, Vec<String>), EvoxtalError> {
    let text = std::fs::read_to_string(run_dir.join(RUN_STATE_FILE))?;
    let mut map = HashMap::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| malformed(format!("expected key: value, got `{line}`")))?;
        map.insert(key.to_string(), value.trim().to_string());
    }

    let mut params = SearchParams {
        description: require(&map, "description")?.to_string(),
        ..Default::default()
    };

    params.composition.clear();
    for entry in require(&map, "composition")?.split_whitespace() {
        let (z, n) = entry
            .split_once(':')
            .ok_or_else(|| malformed(format!("bad composition entry `{entry}`")))?;
        params.composition.insert(
            parse_value("composition species", z)?,
            parse_value("composition count", n)?,
        );
    }

    params.num_initial = parse_req(&map, "num_initial")?;
    params.pop_size = parse_req(&map, "pop_size")?;
    params.gen_total = parse_req(&map, "gen_total")?;
    params.cont_structs = parse_req(&map, "cont_structs")?;
    params.running_job_limit = parse_req(&map, "running_job_limit")?;
    params.limit_running_jobs = parse_req(&map, "limit_running_jobs")?;
    params.p_cross = parse_req(&map, "p_cross")?;
    params.p_strip = parse_req(&map, "p_strip")?;
    params.p_perm = parse_req(&map, "p_perm")?;
    params.cross_min_contribution = parse_req(&map, "cross_min_contribution")?;
    params.strip_amp_min = parse_req(&map, "strip_amp_min")?;
    params.strip_amp_max = parse_req(&map, "strip_amp_max")?;
    params.strip_per1 = parse_req(&map, "strip_per1")?;
    params.strip_per2 = parse_req(&map, "strip_per2")?;
    params.strip_strain_stdev_min = parse_req(&map, "strip_strain_stdev_min")?;
    params.strip_strain_stdev_max = parse_req(&map, "strip_strain_stdev_max")?;
    params.perm_ex = parse_req(&map, "perm_ex")?;
    params.perm_strain_stdev_max = parse_req(&map, "perm_strain_stdev_max")?;
    params.limits = CellLimits {
        a: ParamRange::new(parse_req(&map, "a_min")?, parse_req(&map, "a_max")?),
        b: ParamRange::new(parse_req(&map, "b_min")?, parse_req(&map, "b_max")?),
        c: ParamRange::new(parse_req(&map, "c_min")?, parse_req(&map, "c_max")?),
        alpha: ParamRange::new(parse_req(&map, "alpha_min")?, parse_req(&map, "alpha_max")?),
        beta: ParamRange::new(parse_req(&map, "beta_min")?, parse_req(&map, "beta_max")?),
        gamma: ParamRange::new(parse_req(&map, "gamma_min")?, parse_req(&map, "gamma_max")?),
        vol_min: parse_req(&map, "vol_min")?,
        vol_max: parse_req(&map, "vol_max")?,
        vol_fixed: parse_req(&map, "vol_fixed")?,
        using_fixed_volume: parse_req(&map, "using_fixed_volume")?,
        min_iad: parse_req(&map, "min_iad")?,
        using_min_iad: parse_req(&map, "using_min_iad")?,
    };
    params.tol_enthalpy = parse_req(&map, "tol_enthalpy")?;
    params.tol_volume = parse_req(&map, "tol_volume")?;
    params.use_xtalcomp_confirmation = parse_req(&map, "use_xtalcomp_confirmation")?;
    params.xc_cart_tol = parse_req(&map, "xc_cart_tol")?;
    params.xc_angle_tol = parse_req(&map, "xc_angle_tol")?;
    params.spacegroup_tol = parse_req(&map, "spacegroup_tol")?;
    params.fail_limit = parse_req(&map, "fail_limit")?;
    params.fail_action = FailAction::from_str(require(&map, "fail_action")?)
        .map_err(|_| malformed(format!("unknown fail_action `{}`", map["fail_action"])))?;
    params.testing_mode = parse_req(&map, "testing_mode")?;
    params.test_structs = parse_req(&map, "test_structs")?;
    params.queue_refresh_interval =
        Duration::from_secs(parse_req(&map, "queue_refresh_interval_secs")?);
    params.queue_refresh_timeout =
        Duration::from_secs(parse_req(&map, "queue_refresh_timeout_secs")?);
    params.sweep_interval = parse_req(&map, "sweep_interval")?;
    params.work_dir = PathBuf::from(require(&map, "work_dir")?);
    params.rem_path = require(&map, "rem_path")?.to_string();

    let crystal_dirs = require(&map, "crystal_dirs")?
        .split_whitespace()
        .map(str::to_string)
        .collect();

    Ok((params, crystal_dirs))
}

fn malformed(msg: String) -> EvoxtalError {
    EvoxtalError::MalformedState(msg)
}

fn require<'a>(map: &'a HashMap<String, String>, key: &str) -> Result<&'a str, EvoxtalError> {
    map.get(key)
        .map(String::as_str)
        .ok_or_else(|| malformed(format!("missing key `{key}`")))
}

fn parse_value<T: FromStr>(what: &str, value: &str) -> Result<T, EvoxtalError> {
    value
        .parse()
        .map_err(|_| malformed(format!("cannot parse {what} from `{value}`")))
}

fn parse_req<T: FromStr>(map: &HashMap<String, String>, key: &str) -> Result<T, EvoxtalError> {
    parse_value(key, require(map, key)?)
}

fn parse_opt<T: FromStr>(
    map: &HashMap<String, String>,
    key: &str,
) -> Result<Option<T>, EvoxtalError> {
    map.get(key)
        .map(|value| parse_value(key, value))
        .transpose()
}
