//! Centralized prompt definitions for the search loop
//!
//! Prompt wording is kept here so the search modules only deal with structure.

/// Marker the candidate generator stops at, so the oracle never invents tool results.
pub const OBSERVATION_STOP: &str = "Observation";

/// Marker that introduces a final answer in the action grammar.
pub const FINAL_ANSWER_MARKER: &str = "Final Answer:";

/// Token a rescue oracle answers with when it cannot fix the call.
pub const GIVE_UP_MARKER: &str = "GIVE UP";

/// Opening instructions for the ReAct-style investigation.
const OPENING_PROMPT: &str = r#"Answer the following question as best you can. You have access to the following tools:

{tools}

Use the following format:

Question1: The overall guideline to what you are going to do
Thought1: Think about what you should do
Action1: the action to take, should be one of [{tool_names}]
Action Input1: the input to the action as arguments. If there are multiple arguments, separate them with commas, in the same order as the tool signature, without naming them.
Observation1: the result of the action
Analyze1: Analyze the result of the action
Thought2: Think about what to do next based on Analyze1
Action2: the action to take, should be one of [{tool_names}]
Action Input2: the input to the action
Observation2: the result of the action
Analyze2: Analyze the result of the action
... (this Thought/Action/Action Input/Observation/Analyze cycle can repeat)
Final Answer: the answer to the question, supported by the evidence gathered so far.

Output either a final answer or an action at each step, never both.
{memory}Begin!

Question1: {input}
Thought1: "#;

/// Rubric for scoring a terminal trajectory.
pub const REWARD_PROMPT: &str = r#"The current trajectory has reached a terminal state and returned an answer.
Check that an answer is actually given and that it rests on solid evidence obtained from an external observation, not on speculation.
Reflect on the trajectory, then output a number in the range [0, 10] representing whether the question has been answered successfully.
0 means no answer or an answer based on pure speculation; 10 means a specific answer grounded in external evidence.
If you are not sure, output a number in the middle of the range.
Think step by step.
Remember to output the number and the number only in the final line."#;

/// Request for a post-mortem on an unsuccessful trajectory.
pub const REFLECTION_PROMPT: &str = r#"First summarize what you did in the current trajectory.
Then, in a few sentences, reflect on it.
Give advice to other agents working on this investigation: what to avoid, what to do better, and what has already been tried."#;

/// Corrective message for nodes whose transition could not be interpreted.
pub const ADJUST_INPUT_MESSAGE: &str =
    "The previous output could not be interpreted as an action or a final answer, please adjust your input.";

/// Build the opening user message of a run.
pub fn opening_prompt(
    tools: &str,
    tool_names: &str,
    input: &str,
    reflections: &[String],
    conclusions: &[String],
) -> String {
    let mut memory = String::new();
    if !reflections.is_empty() {
        memory.push_str("\nReflections from previous attempts at this kind of investigation:\n");
        for reflection in reflections {
            memory.push_str("- ");
            memory.push_str(reflection.trim());
            memory.push('\n');
        }
    }
    if !conclusions.is_empty() {
        memory.push_str("\nConclusions established so far:\n");
        for conclusion in conclusions {
            memory.push_str("- ");
            memory.push_str(conclusion.trim());
            memory.push('\n');
        }
    }
    if !memory.is_empty() {
        memory.push('\n');
    }

    OPENING_PROMPT
        .replace("{tools}", tools)
        .replace("{tool_names}", tool_names)
        .replace("{memory}", &memory)
        .replace("{input}", input)
}

/// Comparative rubric for `n` sibling branches.
pub fn multi_evaluation_prompt(n: usize) -> String {
    format!(
        r#"You were given {n} choices for the next step of our investigation.
For each choice, evaluate its validity and whether it is promising on the path toward answering the question.
Finally, in {n} separate lines, output a number in the range [1, 10] that represents how promising each choice is.
The lines must be in the same order as the choices, in the format `branch <choice_number>: <score>`."#
    )
}

/// Suffix appended after an observation, numbered by depth.
pub fn observation_message(depth: usize, text: &str) -> String {
    format!("Observation{depth}: {text}\nAnalyze{depth}: ")
}

/// Corrective message for oracle output that does not parse.
pub fn parse_failure_message(error: &str) -> String {
    format!("Could not parse output: {error}")
}

/// Ask the secondary oracle to map an unknown tool name onto the catalogue.
pub fn tool_name_rescue_prompt(requested: &str, tool_names: &[String], attempts: &[String]) -> String {
    let mut prompt = format!(
        "An agent tried to call a tool named `{requested}`, which does not exist.\n\
         The available tools are: {}.\n\
         Reply with the single tool name from that list that the agent most likely meant, and nothing else.\n\
         If none of them fits, reply with {GIVE_UP_MARKER}.",
        tool_names.join(", ")
    );
    if !attempts.is_empty() {
        prompt.push_str("\nThese replies were already tried and are not valid tool names: ");
        prompt.push_str(&attempts.join(", "));
    }
    prompt
}

/// Ask the secondary oracle to repair the arguments of a failing tool call.
pub fn argument_rescue_prompt(
    signature: &str,
    arguments: &str,
    error: &str,
    attempts: &[(String, String)],
) -> String {
    let mut prompt = format!(
        "An agent called the tool `{signature}` with the arguments `{arguments}` and it failed with:\n{error}\n"
    );
    if !attempts.is_empty() {
        prompt.push_str("\nThe following corrections were already tried and also failed:\n");
        for (args, err) in attempts {
            prompt.push_str(&format!("- `{args}` -> {err}\n"));
        }
    }
    prompt.push_str(&format!(
        "\nIf the call can be fixed by changing the arguments, reply with a single line of the form\n\
         Action Input: <corrected arguments, comma separated, in signature order>\n\
         If it cannot be fixed, reply with {GIVE_UP_MARKER}."
    ));
    prompt
}
